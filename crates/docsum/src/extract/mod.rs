pub mod doc_binary;
pub mod pdf;
pub mod text;
pub mod word;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::error::{DocsumError, ExtractError};

/// An uploaded file as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    /// MIME type as declared by the client.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// MIME type implied by the file extension, for uploads that declare none.
pub fn guess_content_type(filename: &str) -> Option<String> {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_types(&self) -> &'static [&'static str];

    /// Upper bound on accepted upload size in bytes.
    fn max_size(&self) -> u64;

    /// Converts raw bytes into text. CPU-bound: call from a blocking thread.
    fn decode(&self, file: &UploadedFile) -> Result<String, ExtractError>;

    fn extract_text(&self, file: &UploadedFile) -> Result<String, ExtractError> {
        validate(self, file)?;
        self.decode(file)
    }
}

/// Size and content-type checks shared by every extractor.
pub fn validate<E: TextExtractor + ?Sized>(
    extractor: &E,
    file: &UploadedFile,
) -> Result<(), ExtractError> {
    if file.size() > extractor.max_size() {
        return Err(ExtractError::TooLarge {
            size: file.size(),
            limit: extractor.max_size(),
        });
    }

    if !extractor.supported_types().contains(&file.content_type.as_str()) {
        return Err(ExtractError::ContentTypeMismatch {
            content_type: file.content_type.clone(),
            expected: extractor
                .supported_types()
                .iter()
                .map(|t| t.to_string())
                .collect(),
        });
    }

    Ok(())
}

/// Maps declared MIME types to extractors.
pub struct ExtractionRegistry {
    extractors: BTreeMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractionRegistry {
    pub fn new() -> Self {
        Self {
            extractors: BTreeMap::new(),
        }
    }

    /// Registry with the PDF, plain text and Word extractors.
    pub fn with_defaults(max_upload_bytes: u64) -> Self {
        let mut registry = Self::new();
        registry.register_all(Arc::new(pdf::PdfExtractor::new(max_upload_bytes)));
        registry.register_all(Arc::new(text::PlainTextExtractor::new(max_upload_bytes)));
        registry.register_all(Arc::new(word::WordExtractor::new(max_upload_bytes)));
        registry
    }

    pub fn register(&mut self, mime_type: impl Into<String>, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(mime_type.into(), extractor);
    }

    /// Registers `extractor` under every type it declares.
    pub fn register_all(&mut self, extractor: Arc<dyn TextExtractor>) {
        for mime_type in extractor.supported_types() {
            self.register(*mime_type, Arc::clone(&extractor));
        }
    }

    pub fn lookup(&self, mime_type: &str) -> Option<Arc<dyn TextExtractor>> {
        self.extractors.get(mime_type).cloned()
    }

    /// Every registered MIME type, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        self.extractors.keys().cloned().collect()
    }

    /// Selects the extractor and runs it on the blocking pool.
    ///
    /// Returns the trimmed text; a document that yields no text is a
    /// validation error.
    pub async fn extract(&self, file: UploadedFile) -> Result<String, DocsumError> {
        let extractor =
            self.lookup(&file.content_type)
                .ok_or_else(|| DocsumError::UnsupportedType {
                    content_type: file.content_type.clone(),
                    supported: self.supported_types(),
                })?;

        validate(extractor.as_ref(), &file)?;

        let span = tracing::info_span!(
            "extract",
            extractor = extractor.name(),
            size = file.bytes.len()
        );
        let text = tokio::task::spawn_blocking(move || {
            let _entered = span.entered();
            extractor.decode(&file)
        })
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(DocsumError::Validation(
                "Could not extract text from document".to_string(),
            ));
        }

        debug!("Extracted {} characters", text.chars().count());
        Ok(text.to_string())
    }
}

impl Default for ExtractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
