//! Logging infrastructure for cuecast
//!
//! Provides unified logging setup using the tracing ecosystem.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::{CuecastError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter (e.g., "info", "debug", "cuecast=debug,tokio=warn")
    pub filter: String,
    /// Include file/line in logs
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Create config for the embedded server (CUECAST_LOG overrides the filter)
    pub fn server() -> Self {
        Self {
            filter: std::env::var("CUECAST_LOG").unwrap_or_else(|_| "info".into()),
            file_line: false,
        }
    }

    /// Create config for development (verbose)
    pub fn development() -> Self {
        Self {
            filter: "debug".into(),
            file_line: true,
        }
    }
}

/// Initialize logging with default configuration
///
/// Uses CUECAST_LOG env var for filter, defaults to "info"
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::server())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| CuecastError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer.with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| CuecastError::internal(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.file_line);
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.filter, "debug");
        assert!(config.file_line);
    }
}
