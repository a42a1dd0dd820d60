use std::path::PathBuf;
use thiserror::Error;

use crate::document::DocumentStatus;

#[derive(Error, Debug)]
pub enum DocsumError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported format. Supported: {}", supported.join(", "))]
    UnsupportedType {
        content_type: String,
        supported: Vec<String>,
    },

    #[error("File too large ({size} bytes, max {})", format_size(*limit))]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {document_id} is in status {current}")]
    InvalidTransition {
        document_id: String,
        current: DocumentStatus,
    },

    #[error("Summary queue is full, try again later")]
    QueueFull,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(ExtractError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Summarization error: {0}")]
    Summarize(#[from] SummarizeError),

    #[error("Worker error: {0}")]
    Worker(WorkerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Human-readable byte count: whole MB or KB when exact, bytes otherwise.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Coarse classification used by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PayloadTooLarge,
    NotFound,
    Unavailable,
    Internal,
}

impl DocsumError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocsumError::Validation(_)
            | DocsumError::UnsupportedType { .. }
            | DocsumError::InvalidTransition { .. } => ErrorKind::Validation,
            DocsumError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            DocsumError::NotFound(_) => ErrorKind::NotFound,
            DocsumError::QueueFull => ErrorKind::Unavailable,
            DocsumError::Extract(e) if e.is_client_error() => ErrorKind::Validation,
            DocsumError::Summarize(SummarizeError::InvalidOptions(_)) => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<ExtractError> for DocsumError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::TooLarge { size, limit } => DocsumError::PayloadTooLarge { size, limit },
            other => DocsumError::Extract(other),
        }
    }
}

impl From<WorkerError> for DocsumError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::QueueFull => DocsumError::QueueFull,
            other => DocsumError::Worker(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnv { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File too large ({size} bytes, max {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Content type '{content_type}' is not handled here, expected one of: {}", expected.join(", "))]
    ContentTypeMismatch {
        content_type: String,
        expected: Vec<String>,
    },

    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),

    #[error("Failed to extract text from DOCX: {0}")]
    Docx(String),

    #[error("Failed to extract text from DOC: {0}")]
    Doc(String),

    #[error("Failed to decode text: {0}")]
    Decode(String),

    #[error("Failed to stage upload in temporary file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    /// True when the failure is caused by the uploaded file rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ExtractError::TempFile(_) | ExtractError::Task(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Invalid summary options: {0}")]
    InvalidOptions(String),

    #[error("Model error: {0}")]
    Model(#[from] crate::summarize::ModelError),

    #[error("Failed to tokenize input: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model produced an empty summary")]
    EmptyOutput,

    #[error("Mutex poisoned - concurrent access failed")]
    MutexPoisoned,

    #[error("Summary task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Summary queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, DocsumError>;
