//! Key-value document store: one flat string hash per document.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::document::{DocumentRecord, DocumentStatus, DocumentSummary, DocumentUpdate};
use crate::error::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Prefix of every document key, so a scan only sees documents.
pub const KEY_PREFIX: &str = "doc:";

pub fn document_key(document_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, document_id)
}

/// Result of a status compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    NotFound,
    /// The record exists but its status was not the expected one.
    Conflict(DocumentStatus),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create(&self, record: &DocumentRecord) -> Result<(), StoreError>;

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, StoreError>;

    /// Merges `update` into an existing record. Returns `false` if the id is unknown.
    async fn update(&self, document_id: &str, update: &DocumentUpdate)
        -> Result<bool, StoreError>;

    /// Applies `update` only if the stored status equals `expected`.
    async fn compare_and_update(
        &self,
        document_id: &str,
        expected: DocumentStatus,
        update: &DocumentUpdate,
    ) -> Result<CasOutcome, StoreError>;

    /// Full scan. Not a snapshot: concurrent writes may or may not be visible.
    async fn scan_all(&self) -> Result<Vec<DocumentSummary>, StoreError>;
}
