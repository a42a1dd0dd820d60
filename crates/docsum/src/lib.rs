pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod service;
pub mod store;
pub mod summarize;
pub mod telemetry;
pub mod worker;

pub use config::{load_settings, load_settings_from_str, Settings};
pub use document::{DocumentRecord, DocumentStatus, DocumentSummary, DocumentUpdate};
pub use error::{DocsumError, ErrorKind, Result};
pub use extract::{ExtractionRegistry, TextExtractor, UploadedFile};
pub use service::DocumentService;
pub use store::{DocumentStore, MemoryStore, RedisStore};
pub use summarize::{ExtractiveSummarizer, ModelManager, Summarizer, SummaryOptions, SummaryStyle};
pub use worker::{JobOutcome, SummaryJob, SummaryPool};
