use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::config::MonitoringConfig;
use crate::error::{BridgeError, Result};

static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level; `RUST_LOG` takes precedence when set
    pub level: Level,
    pub thread_names: bool,
    /// Include file and line of each event
    pub source_location: bool,
    pub log_spans: bool,
    /// Append to this file instead of writing to stdout
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            thread_names: true,
            source_location: false,
            log_spans: false,
            file_path: None,
        }
    }
}

impl From<&MonitoringConfig> for LogConfig {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            level: config.log_level.into(),
            ..Default::default()
        }
    }
}

/// Install the global subscriber. Only the first call has an effect; later calls
/// return the first outcome.
pub fn setup_logging(config: &LogConfig) -> Result<()> {
    INIT.get_or_init(|| setup_logging_internal(config))
        .clone()
        .map_err(|message| BridgeError::configuration("logging", message))
}

fn setup_logging_internal(config: &LogConfig) -> std::result::Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(config.level.into()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(config.thread_names)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(if config.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| format!("Failed to set global subscriber: {}", e))
        }
        None => builder
            .try_init()
            .map_err(|e| format!("Failed to set global subscriber: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_setup_is_idempotent() {
        let first = setup_logging(&LogConfig::default()).is_ok();
        let second = setup_logging(&LogConfig {
            level: Level::DEBUG,
            ..Default::default()
        })
        .is_ok();
        assert_eq!(first, second);
        tracing::info!("logging ready");
    }

    #[test]
    fn test_from_monitoring_config() {
        let monitoring = MonitoringConfig {
            enable_metrics: true,
            log_level: LogLevel::Trace,
        };
        let config = LogConfig::from(&monitoring);
        assert_eq!(config.level, Level::TRACE);
        assert!(config.file_path.is_none());
    }
}
