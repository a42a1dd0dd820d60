//! In-process store with the same flat encoding as Redis.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::document::{
    DocumentRecord, DocumentStatus, DocumentSummary, DocumentUpdate, FIELD_CREATED_AT, FIELD_STATUS,
};
use crate::error::StoreError;
use crate::store::{document_key, CasOutcome, DocumentStore, KEY_PREFIX};

struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        if self.ttl.is_some() {
            entries.retain(|_, entry| entry.is_live(now));
        }
        entries.insert(
            document_key(&record.document_id),
            Entry {
                fields: record.to_fields().into_iter().collect(),
                expires_at: self.ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        match entries.get(&document_key(document_id)) {
            Some(entry) if entry.is_live(Instant::now()) => {
                DocumentRecord::from_fields(document_id, &entry.fields).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn update(
        &self,
        document_id: &str,
        update: &DocumentUpdate,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        match entries.get_mut(&document_key(document_id)) {
            Some(entry) if entry.is_live(Instant::now()) => {
                entry.fields.extend(update.to_fields());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_update(
        &self,
        document_id: &str,
        expected: DocumentStatus,
        update: &DocumentUpdate,
    ) -> Result<CasOutcome, StoreError> {
        let key = document_key(document_id);
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let entry = match entries.get_mut(&key) {
            Some(entry) if entry.is_live(Instant::now()) => entry,
            _ => return Ok(CasOutcome::NotFound),
        };

        let current = entry
            .fields
            .get(FIELD_STATUS)
            .map(String::as_str)
            .unwrap_or_default()
            .parse::<DocumentStatus>()
            .map_err(|reason| StoreError::Corrupt { key, reason })?;

        if current != expected {
            return Ok(CasOutcome::Conflict(current));
        }

        entry.fields.extend(update.to_fields());
        Ok(CasOutcome::Applied)
    }

    async fn scan_all(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();

        let mut documents = Vec::with_capacity(entries.len());
        for (key, entry) in entries.iter().filter(|(_, e)| e.is_live(now)) {
            let status = match entry.fields.get(FIELD_STATUS).map(|s| s.parse()) {
                Some(Ok(status)) => status,
                _ => {
                    log::warn!("Skipping document {} with unreadable status", key);
                    continue;
                }
            };
            documents.push(DocumentSummary {
                document_id: key.trim_start_matches(KEY_PREFIX).to_string(),
                status,
                created_at: entry.fields.get(FIELD_CREATED_AT).cloned().unwrap_or_default(),
            });
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> DocumentRecord {
        DocumentRecord::new(id, "Hello world", "hello.txt", "text/plain")
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let rec = record("a");
        store.create(&rec).await.unwrap();

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.text, "Hello world");
        assert_eq!(loaded.status, DocumentStatus::Uploaded);
        assert!(loaded.result.is_none());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        store.create(&record("a")).await.unwrap();

        let update = DocumentUpdate {
            result: Some("Short summary".to_string()),
            ..DocumentUpdate::default()
        };
        assert!(store.update("a", &update).await.unwrap());

        let loaded = store.get("a").await.unwrap().unwrap();
        assert_eq!(loaded.result.as_deref(), Some("Short summary"));
        // untouched fields keep their values
        assert_eq!(loaded.status, DocumentStatus::Uploaded);
        assert_eq!(loaded.text, "Hello world");
    }

    #[tokio::test]
    async fn test_update_unknown_does_not_create() {
        let store = MemoryStore::new();
        let applied = store
            .update("ghost", &DocumentUpdate::status(DocumentStatus::Done))
            .await
            .unwrap();
        assert!(!applied);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_update_conflict_reports_current() {
        let store = MemoryStore::new();
        store.create(&record("a")).await.unwrap();

        let to_processing = DocumentUpdate::status(DocumentStatus::Processing);
        assert_eq!(
            store
                .compare_and_update("a", DocumentStatus::Uploaded, &to_processing)
                .await
                .unwrap(),
            CasOutcome::Applied
        );
        assert_eq!(
            store
                .compare_and_update("a", DocumentStatus::Uploaded, &to_processing)
                .await
                .unwrap(),
            CasOutcome::Conflict(DocumentStatus::Processing)
        );
        assert_eq!(
            store
                .compare_and_update("zzz", DocumentStatus::Uploaded, &to_processing)
                .await
                .unwrap(),
            CasOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_scan_all_lists_every_document() {
        let store = MemoryStore::new();
        assert!(store.scan_all().await.unwrap().is_empty());

        store.create(&record("a")).await.unwrap();
        store.create(&record("b")).await.unwrap();

        let mut ids: Vec<String> = store
            .scan_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.document_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_records_disappear() {
        let store = MemoryStore::with_ttl(Some(Duration::from_millis(20)));
        store.create(&record("a")).await.unwrap();
        assert!(store.get("a").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.scan_all().await.unwrap().is_empty());
        assert_eq!(store.len(), 0);

        // the next write drops the expired entry from the map itself
        store.create(&record("b")).await.unwrap();
        let entries = store.entries.read().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(&document_key("b")));
    }

    #[tokio::test]
    async fn test_without_ttl_nothing_is_purged() {
        let store = MemoryStore::new();
        store.create(&record("a")).await.unwrap();
        store.create(&record("b")).await.unwrap();
        assert_eq!(store.entries.read().unwrap().len(), 2);
    }
}
