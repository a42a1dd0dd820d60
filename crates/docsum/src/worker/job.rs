use crate::summarize::SummaryOptions;

#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub document_id: String,
    /// Extracted document text, copied from the record at enqueue time.
    pub text: String,
    pub options: SummaryOptions,
}

impl SummaryJob {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>, options: SummaryOptions) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            options,
        }
    }
}

/// Final result of a job after all attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub document_id: String,
    pub attempts: u32,
    /// The summary, or the last error message.
    pub result: Result<String, String>,
}

impl JobOutcome {
    pub fn success(document_id: impl Into<String>, attempts: u32, summary: String) -> Self {
        Self {
            document_id: document_id.into(),
            attempts,
            result: Ok(summary),
        }
    }

    pub fn failure(document_id: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            attempts,
            result: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
