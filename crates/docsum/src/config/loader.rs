use std::path::Path;

use log::{debug, info};

use crate::config::schema::{Settings, StoreBackend};
use crate::error::ConfigError;
use crate::summarize::MAX_NEW_TOKENS_LIMIT;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const CONFIG_ENV: &str = "DOCSUM_CONFIG";
pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const BIND_ADDR_ENV: &str = "DOCSUM_BIND_ADDR";
pub const STORE_ENV: &str = "DOCSUM_STORE";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: Settings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

impl Settings {
    /// Reads the file named by `DOCSUM_CONFIG` (defaults when unset), then
    /// applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading configuration from {}", path);
                load_settings(path)?
            }
            _ => {
                debug!("{} not set, using default configuration", CONFIG_ENV);
                Settings::default()
            }
        };

        settings.apply_env_overrides(|name| std::env::var(name).ok())?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Applies `REDIS_URL`, `DOCSUM_BIND_ADDR` and `DOCSUM_STORE` from `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(REDIS_URL_ENV).filter(|v| !v.is_empty()) {
            self.store.redis_url = url;
        }
        if let Some(addr) = lookup(BIND_ADDR_ENV).filter(|v| !v.is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(backend) = lookup(STORE_ENV).filter(|v| !v.is_empty()) {
            self.store.backend = match backend.to_ascii_lowercase().as_str() {
                "redis" => StoreBackend::Redis,
                "memory" => StoreBackend::Memory,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        name: STORE_ENV.to_string(),
                        reason: format!("expected 'redis' or 'memory', got '{}'", other),
                    })
                }
            };
        }
        Ok(())
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if settings.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return invalid(format!("Invalid bind address: {}", settings.bind_addr));
    }
    if settings.store.backend == StoreBackend::Redis
        && !(settings.store.redis_url.starts_with("redis://")
            || settings.store.redis_url.starts_with("rediss://")
            || settings.store.redis_url.starts_with("unix://"))
    {
        return invalid(format!("Invalid Redis URL: {}", settings.store.redis_url));
    }
    if settings.store.record_ttl_secs == Some(0) {
        return invalid("store.record_ttl_secs must be positive".to_string());
    }
    if settings.upload.max_bytes == 0 {
        return invalid("upload.max_bytes must be positive".to_string());
    }
    if settings.worker.worker_count == 0 {
        return invalid("worker.worker_count must be > 0".to_string());
    }
    if settings.worker.queue_capacity == 0 {
        return invalid("worker.queue_capacity must be > 0".to_string());
    }
    if settings.worker.max_attempts == 0 {
        return invalid("worker.max_attempts must be > 0".to_string());
    }
    if settings.summary.max_new_tokens == 0 || settings.summary.max_new_tokens > MAX_NEW_TOKENS_LIMIT
    {
        return invalid(format!(
            "summary.max_new_tokens must be between 1 and {}",
            MAX_NEW_TOKENS_LIMIT
        ));
    }
    if settings.summary.max_input_tokens <= settings.summary.max_new_tokens {
        return invalid("summary.max_input_tokens must exceed max_new_tokens".to_string());
    }

    Ok(())
}
