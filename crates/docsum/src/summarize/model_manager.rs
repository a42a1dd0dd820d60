//! Lazy, shared summarisation model.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[cfg(feature = "ai")]
use hf_hub::api::sync::Api;
#[cfg(feature = "ai")]
use hf_hub::{Repo, RepoType};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{ModelConfig, SummaryConfig};
use crate::error::SummarizeError;
use crate::summarize::{Summarizer, SummaryOptions};

#[cfg(feature = "ai")]
type Engine = crate::summarize::llama::LlamaEngine;
#[cfg(not(feature = "ai"))]
type Engine = crate::summarize::extractive::ExtractiveSummarizer;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to create cache directory: {0}")]
    CacheDirectoryCreation(#[from] std::io::Error),

    #[error("Failed to download model from Hugging Face: {0}")]
    HuggingFaceDownload(String),

    #[error("Failed to initialize LLM backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Model lock poisoned")]
    LockPoisoned,
}

/// Owns the summarisation engine. Loading happens on first use or through an
/// explicit [`ModelManager::load`]; [`ModelManager::unload`] frees it again.
pub struct ModelManager {
    cache_dir: PathBuf,
    model_repo: String,
    model_file: String,
    max_input_tokens: usize,
    engine: Mutex<Option<Engine>>,
    loaded: AtomicBool,
}

impl ModelManager {
    pub fn new(
        cache_dir: impl AsRef<Path>,
        model_repo: &str,
        model_file: &str,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            model_repo: model_repo.to_string(),
            model_file: model_file.to_string(),
            max_input_tokens,
            engine: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn from_config(model: &ModelConfig, summary: &SummaryConfig) -> Self {
        Self::new(
            &model.model_cache_dir,
            &model.model_repo,
            &model.model_file,
            summary.max_input_tokens,
        )
    }

    pub fn model_path(&self) -> PathBuf {
        self.cache_dir.join(&self.model_file)
    }

    /// "Qwen/Qwen2.5-1.5B-Instruct-GGUF" -> "Qwen2.5-1.5B-Instruct"
    pub fn model_name(&self) -> String {
        self.model_repo
            .split('/')
            .next_back()
            .unwrap_or(&self.model_repo)
            .replace("-GGUF", "")
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Loads the engine if it is not loaded yet. Calling it again is a no-op.
    pub fn load(&self) -> Result<(), ModelError> {
        let mut engine = self.engine.lock().map_err(|_| ModelError::LockPoisoned)?;
        self.load_into(&mut engine)
    }

    fn load_into(&self, slot: &mut Option<Engine>) -> Result<(), ModelError> {
        if slot.is_some() {
            return Ok(());
        }

        let _span = tracing::info_span!("model_load", model = %self.model_name()).entered();
        *slot = Some(self.create_engine()?);
        self.loaded.store(true, Ordering::Release);
        info!("Summarization model ready: {}", self.model_name());
        Ok(())
    }

    /// Drops the engine and its memory. The next summary loads it again.
    pub fn unload(&self) {
        match self.engine.lock() {
            Ok(mut engine) => {
                if engine.take().is_some() {
                    info!("Summarization model unloaded");
                }
            }
            Err(poisoned) => {
                warn!("Model lock poisoned, clearing engine anyway");
                poisoned.into_inner().take();
            }
        }
        self.loaded.store(false, Ordering::Release);
    }

    #[cfg(feature = "ai")]
    fn create_engine(&self) -> Result<Engine, ModelError> {
        let path = self.ensure_model()?;
        crate::summarize::llama::LlamaEngine::load(&path, self.max_input_tokens)
    }

    #[cfg(not(feature = "ai"))]
    fn create_engine(&self) -> Result<Engine, ModelError> {
        debug!("Built without the ai feature, using extractive summaries");
        Ok(crate::summarize::extractive::ExtractiveSummarizer::new(
            self.max_input_tokens,
        ))
    }

    /// Downloads the model into the cache directory unless it is already there.
    #[cfg(feature = "ai")]
    pub fn ensure_model(&self) -> Result<PathBuf, ModelError> {
        let model_path = self.model_path();
        if model_path.exists() {
            debug!("Model already cached at: {}", model_path.display());
            return Ok(model_path);
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        info!(
            "Downloading model {} from {}...",
            self.model_file, self.model_repo
        );

        let api = Api::new().map_err(|e| ModelError::HuggingFaceDownload(e.to_string()))?;
        let repo = api.repo(Repo::new(self.model_repo.clone(), RepoType::Model));
        let downloaded_path = repo
            .get(&self.model_file)
            .map_err(|e| ModelError::HuggingFaceDownload(e.to_string()))?;
        info!("Model downloaded to: {}", downloaded_path.display());

        // hf-hub keeps its own cache; link to it instead of duplicating the weights
        #[cfg(unix)]
        {
            if let Err(e) = std::os::unix::fs::symlink(&downloaded_path, &model_path) {
                warn!("Failed to create symlink, copying instead: {}", e);
                std::fs::copy(&downloaded_path, &model_path)?;
            }
        }
        #[cfg(not(unix))]
        {
            std::fs::copy(&downloaded_path, &model_path)?;
        }

        Ok(model_path)
    }
}

impl Summarizer for ModelManager {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> Result<String, SummarizeError> {
        options.validate()?;

        let mut slot = self.engine.lock().map_err(|_| SummarizeError::MutexPoisoned)?;
        self.load_into(&mut slot)?;
        let engine = slot
            .as_ref()
            .ok_or_else(|| SummarizeError::Inference("model is not loaded".to_string()))?;

        let _span = tracing::info_span!(
            "summarize",
            chars = text.len(),
            max_new_tokens = options.max_new_tokens
        )
        .entered();
        let summary = engine.summarize(text, options)?;
        debug!("Generated summary of {} characters", summary.len());
        Ok(summary)
    }
}
