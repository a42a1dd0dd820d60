//! Composition root tying extraction, storage and summarisation together.

use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Settings, StoreBackend, SummaryConfig, WorkerConfig};
use crate::document::lifecycle;
use crate::document::{DocumentRecord, DocumentStatus, DocumentSummary, DocumentUpdate};
use crate::error::{DocsumError, Result, SummarizeError};
use crate::extract::{ExtractionRegistry, UploadedFile};
use crate::store::{DocumentStore, MemoryStore, RedisStore};
use crate::summarize::{ModelManager, Summarizer, SummaryOptions};
use crate::worker::{JobOutcome, SummaryJob, SummaryPool};

pub type OutcomeReceiver = UnboundedReceiver<JobOutcome>;

pub struct DocumentService {
    registry: ExtractionRegistry,
    store: Arc<dyn DocumentStore>,
    summarizer: Arc<dyn Summarizer>,
    /// Set when the summarizer is a [`ModelManager`], for preload and unload.
    model: Option<Arc<ModelManager>>,
    pool: SummaryPool,
    default_options: SummaryOptions,
}

impl DocumentService {
    /// Builds the service and its worker pool. Outcomes arrive on the returned
    /// receiver; pass it to [`DocumentService::launch`].
    pub fn new(
        registry: ExtractionRegistry,
        store: Arc<dyn DocumentStore>,
        summarizer: Arc<dyn Summarizer>,
        worker: &WorkerConfig,
        default_options: SummaryOptions,
    ) -> Result<(Self, OutcomeReceiver)> {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let pool = SummaryPool::new(Arc::clone(&summarizer), worker, outcome_tx)?;

        Ok((
            Self {
                registry,
                store,
                summarizer,
                model: None,
                pool,
                default_options,
            },
            outcome_rx,
        ))
    }

    pub fn with_model(mut self, model: Arc<ModelManager>) -> Self {
        self.model = Some(model);
        self
    }

    /// Wraps the service and starts applying outcomes. Needs a Tokio runtime.
    pub fn launch(self, outcomes: OutcomeReceiver) -> Arc<Self> {
        let service = Arc::new(self);
        service.spawn_outcome_writer(outcomes);
        service
    }

    /// Builds every component from `settings` and launches the service.
    pub fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let store: Arc<dyn DocumentStore> = match settings.store.backend {
            StoreBackend::Redis => {
                info!("Using Redis store at {}", redact_url(&settings.store.redis_url));
                Arc::new(RedisStore::new(
                    &settings.store.redis_url,
                    settings.store.record_ttl_secs,
                )?)
            }
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::with_ttl(
                    settings.store.record_ttl_secs.map(Duration::from_secs),
                ))
            }
        };

        let model = Arc::new(ModelManager::from_config(&settings.model, &settings.summary));
        let registry = ExtractionRegistry::with_defaults(settings.upload.max_bytes);
        let (service, outcomes) = Self::new(
            registry,
            store,
            Arc::clone(&model) as Arc<dyn Summarizer>,
            &settings.worker,
            default_options(&settings.summary),
        )?;

        Ok(service.with_model(model).launch(outcomes))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn supported_types(&self) -> Vec<String> {
        self.registry.supported_types()
    }

    pub fn model_loaded(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.is_loaded())
    }

    // ─── Operations ─────────────────────────────────────────────────────────

    /// Extracts the text of `file` and stores a new `uploaded` record.
    /// Nothing is stored when extraction fails.
    pub async fn upload(&self, file: UploadedFile) -> Result<DocumentRecord> {
        if file.filename.trim().is_empty() {
            return Err(DocsumError::Validation("No file uploaded".to_string()));
        }

        let filename = file.filename.clone();
        let content_type = file.content_type.clone();
        let text = self.registry.extract(file).await?;

        let record = DocumentRecord::new(Uuid::new_v4().to_string(), text, filename, content_type);
        self.store.create(&record).await?;

        info!(
            "Uploaded {} as document {} ({} characters)",
            record.filename,
            record.document_id,
            record.text.chars().count()
        );
        Ok(record)
    }

    /// Moves the document to `processing` and queues its summary.
    ///
    /// When the queue is full the status is put back to `uploaded` so the
    /// request can be retried.
    pub async fn generate(
        &self,
        document_id: &str,
        options: Option<SummaryOptions>,
    ) -> Result<DocumentStatus> {
        let options = options.unwrap_or_else(|| self.default_options.clone());
        options.validate()?;

        let record = self.get(document_id).await?;
        if record.status != DocumentStatus::Uploaded {
            return Err(DocsumError::InvalidTransition {
                document_id: document_id.to_string(),
                current: record.status,
            });
        }

        lifecycle::transition(
            self.store.as_ref(),
            document_id,
            DocumentStatus::Uploaded,
            DocumentUpdate::status(DocumentStatus::Processing),
        )
        .await?;

        let job = SummaryJob::new(document_id, record.text, options);
        if let Err(e) = self.pool.try_submit(job) {
            self.roll_back_to_uploaded(document_id).await;
            return Err(e.into());
        }

        debug!("Queued summary for {}", document_id);
        Ok(DocumentStatus::Processing)
    }

    async fn roll_back_to_uploaded(&self, document_id: &str) {
        match lifecycle::transition(
            self.store.as_ref(),
            document_id,
            DocumentStatus::Processing,
            DocumentUpdate::status(DocumentStatus::Uploaded),
        )
        .await
        {
            Ok(()) => debug!("Document {} returned to uploaded", document_id),
            Err(e) => error!("Could not roll back {}: {}", document_id, e),
        }
    }

    /// Records a finished job: `processing → done` with the summary, or
    /// `processing → error` with the failure detail.
    pub async fn apply_outcome(&self, outcome: JobOutcome) -> Result<()> {
        let update = match outcome.result {
            Ok(summary) => DocumentUpdate::status(DocumentStatus::Done).with_result(summary),
            Err(detail) => {
                warn!(
                    "Summary for {} failed after {} attempt(s): {}",
                    outcome.document_id, outcome.attempts, detail
                );
                DocumentUpdate::status(DocumentStatus::Error).with_error(detail)
            }
        };

        lifecycle::transition(
            self.store.as_ref(),
            &outcome.document_id,
            DocumentStatus::Processing,
            update,
        )
        .await
    }

    /// Applies outcomes until every sender is gone. The task holds only a weak
    /// reference, so dropping the service ends it.
    pub fn spawn_outcome_writer(self: &Arc<Self>, mut outcomes: OutcomeReceiver) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(outcome) = outcomes.recv().await {
                let Some(service) = service.upgrade() else {
                    break;
                };
                let document_id = outcome.document_id.clone();
                if let Err(e) = service.apply_outcome(outcome).await {
                    error!("Failed to record summary outcome for {}: {}", document_id, e);
                }
            }
            debug!("Outcome writer stopped");
        })
    }

    /// Every stored document, oldest first.
    pub async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let mut documents = self.store.scan_all().await?;
        documents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        Ok(documents)
    }

    pub async fn get(&self, document_id: &str) -> Result<DocumentRecord> {
        self.store
            .get(document_id)
            .await?
            .ok_or_else(|| DocsumError::NotFound(document_id.to_string()))
    }

    /// Summarises the stored text again and returns the new summary. The
    /// record itself is left untouched.
    pub async fn regenerate(
        &self,
        document_id: &str,
        options: Option<SummaryOptions>,
    ) -> Result<String> {
        let options = options.unwrap_or_else(|| self.default_options.clone());
        options.validate()?;

        let record = self.get(document_id).await?;
        if record.text.trim().is_empty() {
            return Err(DocsumError::Validation(
                "Document text is not available".to_string(),
            ));
        }

        let summarizer = Arc::clone(&self.summarizer);
        let summary =
            tokio::task::spawn_blocking(move || summarizer.summarize(&record.text, &options))
                .await
                .map_err(|e| SummarizeError::Task(e.to_string()))??;

        info!("Regenerated summary for {}", document_id);
        Ok(summary)
    }

    /// Loads the model ahead of the first request. Failures are logged only;
    /// the model is loaded lazily later.
    pub async fn warm_up(&self) {
        let Some(model) = self.model.clone() else {
            return;
        };

        match tokio::task::spawn_blocking(move || model.load()).await {
            Ok(Ok(())) => info!("Model preloaded"),
            Ok(Err(e)) => warn!("Model preload failed, will retry on first use: {}", e),
            Err(e) => warn!("Model preload task failed: {}", e),
        }
    }

    /// Stops the workers and releases the model. Blocks until workers exit.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.pool.wait();
        if let Some(model) = &self.model {
            model.unload();
        }
    }
}

pub fn default_options(summary: &SummaryConfig) -> SummaryOptions {
    SummaryOptions {
        max_new_tokens: summary.max_new_tokens,
        style: summary.style,
    }
}

/// Hides the password of a Redis URL for logging.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
