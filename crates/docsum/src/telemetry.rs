//! Process-wide logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::DocsumError;

/// `RUST_LOG` when set, otherwise the configured filter.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber and routes `log` records into it.
///
/// Fails if a subscriber or logger is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DocsumError> {
    let filter = env_filter(config);

    match config.format {
        LogFormat::Pretty => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = Registry::default().with(filter).with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_ansi(false),
            );
            tracing::subscriber::set_global_default(subscriber)
        }
    }
    .map_err(|e| DocsumError::Internal(format!("Failed to install subscriber: {}", e)))?;

    tracing_log::LogTracer::init()
        .map_err(|e| DocsumError::Internal(format!("Failed to bridge log records: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_invalid_filter_falls_back() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            format: LogFormat::Pretty,
            filter: "docsum=notalevel".to_string(),
        };
        assert_eq!(env_filter(&config).to_string(), "info");
    }

    #[test]
    #[serial]
    fn test_configured_filter_used_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            format: LogFormat::Json,
            filter: "docsum=debug".to_string(),
        };
        assert_eq!(env_filter(&config).to_string(), "docsum=debug");
    }
}
