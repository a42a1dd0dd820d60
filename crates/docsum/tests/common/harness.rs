//! Test harness for isolated service execution.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use docsum::config::WorkerConfig;
use docsum::{
    DocumentRecord, DocumentService, DocumentStatus, ExtractionRegistry, ExtractiveSummarizer,
    MemoryStore, Summarizer, SummaryOptions, UploadedFile,
};

pub const UPLOAD_LIMIT: u64 = 1024 * 1024;

/// A launched service over a fresh in-memory store.
pub struct TestHarness {
    pub service: Arc<DocumentService>,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Extractive summaries, one worker, default queue.
    pub fn new() -> Self {
        Self::with_summarizer(
            Arc::new(ExtractiveSummarizer::default()),
            WorkerConfig::default(),
        )
    }

    pub fn with_summarizer(summarizer: Arc<dyn Summarizer>, worker: WorkerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let (service, outcomes) = DocumentService::new(
            ExtractionRegistry::with_defaults(UPLOAD_LIMIT),
            Arc::clone(&store) as _,
            summarizer,
            &worker,
            SummaryOptions::default(),
        )
        .expect("Failed to build service");

        Self {
            service: service.launch(outcomes),
            store,
        }
    }

    pub async fn upload_text(&self, text: &str) -> DocumentRecord {
        self.service
            .upload(UploadedFile::new(
                "document.txt",
                "text/plain",
                text.as_bytes().to_vec(),
            ))
            .await
            .expect("Upload failed")
    }

    /// Polls until the document reaches `status` or five seconds pass.
    pub async fn wait_for_status(&self, document_id: &str, status: DocumentStatus) -> DocumentRecord {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let record = self
                .service
                .get(document_id)
                .await
                .expect("Document disappeared");
            if record.status == status {
                return record;
            }
            if Instant::now() > deadline {
                panic!(
                    "Document {} stuck in {} waiting for {}",
                    document_id, record.status, status
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops workers on a blocking thread so the runtime keeps running.
    pub async fn shutdown(self) {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || service.shutdown())
            .await
            .expect("Shutdown task panicked");
    }
}
