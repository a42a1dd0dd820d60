use serde::{Deserialize, Serialize};

use crate::summarize::{SummaryStyle, DEFAULT_MAX_NEW_TOKENS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store: StoreConfig::default(),
            upload: UploadConfig::default(),
            worker: WorkerConfig::default(),
            summary: SummaryConfig::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─── Store ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Documents expire after this many seconds. Unset keeps them forever.
    #[serde(default)]
    pub record_ttl_secs: Option<u64>,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            record_ttl_secs: None,
        }
    }
}

// ─── Upload ─────────────────────────────────────────────────────────────────

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

// ─── Worker ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Summary threads. The model is shared, so more than one mostly helps
    /// when the engine is cheap.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Attempts per job, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_worker_count() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    16
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
        }
    }
}

// ─── Summary & model ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// Input beyond this many tokens is dropped before generation.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default)]
    pub style: Option<SummaryStyle>,
}

fn default_max_new_tokens() -> usize {
    DEFAULT_MAX_NEW_TOKENS
}

fn default_max_input_tokens() -> usize {
    2048
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            max_input_tokens: default_max_input_tokens(),
            style: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Load the model at startup instead of on the first summary.
    #[serde(default)]
    pub preload: bool,
    #[serde(default = "default_model_cache")]
    pub model_cache_dir: String,
    /// Model repository on Hugging Face.
    #[serde(default = "default_model_repo")]
    pub model_repo: String,
    /// Model filename (GGUF format).
    #[serde(default = "default_model_file")]
    pub model_file: String,
}

fn default_model_cache() -> String {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
        .map(|p| p.join("docsum").join("models").to_string_lossy().to_string())
        .unwrap_or_else(|| "models".to_string())
}

fn default_model_repo() -> String {
    "Qwen/Qwen2.5-1.5B-Instruct-GGUF".to_string()
}

fn default_model_file() -> String {
    "qwen2.5-1.5b-instruct-q4_k_m.gguf".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            preload: false,
            model_cache_dir: default_model_cache(),
            model_repo: default_model_repo(),
            model_file: default_model_file(),
        }
    }
}

// ─── Logging ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}
