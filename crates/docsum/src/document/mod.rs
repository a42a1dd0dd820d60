//! Document records and their flat string encoding.

pub mod lifecycle;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ─── Status ─────────────────────────────────────────────────────────────────

/// Processing status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Done,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Done => "done",
            DocumentStatus::Error => "error",
        }
    }

    /// `done` and `error` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Done | DocumentStatus::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "done" => Ok(DocumentStatus::Done),
            "error" => Ok(DocumentStatus::Error),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

// ─── Field names & timestamp codec ──────────────────────────────────────────

pub const FIELD_STATUS: &str = "status";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_RESULT: &str = "result";
pub const FIELD_ERROR: &str = "error";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_CONTENT_TYPE: &str = "content_type";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";

/// Fixed-width RFC 3339 so that stored timestamps sort lexicographically.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

// ─── Record ─────────────────────────────────────────────────────────────────

/// The persisted state of one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub status: DocumentStatus,
    pub text: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Creates a freshly uploaded record.
    pub fn new(
        document_id: impl Into<String>,
        text: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id: document_id.into(),
            status: DocumentStatus::Uploaded,
            text: text.into(),
            result: None,
            error: None,
            filename: filename.into(),
            content_type: content_type.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_STATUS.to_string(), self.status.as_str().to_string()),
            (FIELD_TEXT.to_string(), self.text.clone()),
            // empty string stands in for "no value"
            (FIELD_RESULT.to_string(), self.result.clone().unwrap_or_default()),
            (FIELD_ERROR.to_string(), self.error.clone().unwrap_or_default()),
            (FIELD_FILENAME.to_string(), self.filename.clone()),
            (FIELD_CONTENT_TYPE.to_string(), self.content_type.clone()),
            (FIELD_CREATED_AT.to_string(), format_timestamp(self.created_at)),
            (FIELD_UPDATED_AT.to_string(), format_timestamp(self.updated_at)),
        ]
    }

    pub fn from_fields(
        document_id: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: document_id.to_string(),
            reason,
        };

        let status = fields
            .get(FIELD_STATUS)
            .ok_or_else(|| corrupt("missing status".to_string()))?
            .parse::<DocumentStatus>()
            .map_err(corrupt)?;

        let created_at = fields
            .get(FIELD_CREATED_AT)
            .ok_or_else(|| corrupt("missing created_at".to_string()))
            .and_then(|s| parse_timestamp(s).map_err(corrupt))?;

        let updated_at = match fields.get(FIELD_UPDATED_AT) {
            Some(s) => parse_timestamp(s).map_err(corrupt)?,
            None => created_at,
        };

        Ok(Self {
            document_id: document_id.to_string(),
            status,
            text: fields.get(FIELD_TEXT).cloned().unwrap_or_default(),
            result: non_empty(fields.get(FIELD_RESULT)),
            error: non_empty(fields.get(FIELD_ERROR)),
            filename: fields.get(FIELD_FILENAME).cloned().unwrap_or_default(),
            content_type: fields.get(FIELD_CONTENT_TYPE).cloned().unwrap_or_default(),
            created_at,
            updated_at,
        })
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            document_id: self.document_id.clone(),
            status: self.status,
            created_at: format_timestamp(self.created_at),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

// ─── Partial update ─────────────────────────────────────────────────────────

/// A partial overwrite. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    pub status: Option<DocumentStatus>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DocumentUpdate {
    /// A status change stamped with the current time.
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            updated_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.result.is_none()
            && self.error.is_none()
            && self.updated_at.is_none()
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(4);
        if let Some(status) = self.status {
            fields.push((FIELD_STATUS.to_string(), status.as_str().to_string()));
        }
        if let Some(result) = &self.result {
            fields.push((FIELD_RESULT.to_string(), result.clone()));
        }
        if let Some(error) = &self.error {
            fields.push((FIELD_ERROR.to_string(), error.clone()));
        }
        if let Some(updated_at) = self.updated_at {
            fields.push((FIELD_UPDATED_AT.to_string(), format_timestamp(updated_at)));
        }
        fields
    }
}

// ─── Listing entry ──────────────────────────────────────────────────────────

/// One row of the status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub status: DocumentStatus,
    /// Stored textual form, which sorts chronologically.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(fields: Vec<(String, String)>) -> HashMap<String, String> {
        fields.into_iter().collect()
    }

    #[test]
    fn test_status_round_trips_through_labels() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::Done,
            DocumentStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>(), Ok(status));
        }
        assert!("finished".parse::<DocumentStatus>().is_err());
        assert!("".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DocumentStatus::Uploaded.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(DocumentStatus::Done.is_terminal());
        assert!(DocumentStatus::Error.is_terminal());
    }

    #[test]
    fn test_new_record_defaults() {
        let record = DocumentRecord::new("abc", "Hello world", "hello.txt", "text/plain");
        assert_eq!(record.status, DocumentStatus::Uploaded);
        assert_eq!(record.result, None);
        assert_eq!(record.error, None);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_record_fields_decode_to_same_record() {
        let mut record = DocumentRecord::new("abc", "Body", "a.pdf", "application/pdf");
        record.created_at = parse_timestamp("2024-05-01T10:00:00.123456Z").unwrap();
        record.updated_at = parse_timestamp("2024-05-01T10:05:00.000001Z").unwrap();

        let decoded = DocumentRecord::from_fields("abc", &as_map(record.to_fields())).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_empty_result_decodes_as_none() {
        let record = DocumentRecord::new("abc", "Body", "a.txt", "text/plain");
        let fields = as_map(record.to_fields());
        assert_eq!(fields.get(FIELD_RESULT).map(String::as_str), Some(""));

        let decoded = DocumentRecord::from_fields("abc", &fields).unwrap();
        assert!(decoded.result.is_none());
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut fields = as_map(DocumentRecord::new("abc", "x", "a.txt", "text/plain").to_fields());
        fields.insert(FIELD_STATUS.to_string(), "archived".to_string());

        match DocumentRecord::from_fields("abc", &fields) {
            Err(StoreError::Corrupt { key, reason }) => {
                assert_eq!(key, "abc");
                assert!(reason.contains("archived"));
            }
            other => panic!("expected corrupt record, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = format_timestamp(parse_timestamp("2024-01-02T03:04:05Z").unwrap());
        let late = format_timestamp(parse_timestamp("2024-01-02T03:04:05.5Z").unwrap());
        assert_eq!(early, "2024-01-02T03:04:05.000000Z");
        assert!(early < late);
    }

    #[test]
    fn test_update_only_encodes_provided_fields() {
        let update = DocumentUpdate {
            result: Some("Summary".to_string()),
            ..DocumentUpdate::default()
        };
        assert_eq!(
            update.to_fields(),
            vec![(FIELD_RESULT.to_string(), "Summary".to_string())]
        );
        assert!(DocumentUpdate::default().is_empty());
        assert!(!DocumentUpdate::status(DocumentStatus::Done).is_empty());
    }
}
