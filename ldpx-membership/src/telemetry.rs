//! Logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a human
//! or JSON formatter. Embedders that already set a global subscriber keep it.

use crate::config::LoggingFileConfig;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    /// Log format ("human" or "json")
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Human,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|key| env::var(key).ok(), None)
    }
}

impl TelemetryConfig {
    /// Environment first, then the file's `[logging]` section, then "info"
    pub fn with_file_config(logging: Option<&LoggingFileConfig>) -> Self {
        Self::from_lookup(|key| env::var(key).ok(), logging)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        logging: Option<&LoggingFileConfig>,
    ) -> Self {
        let log_filter = lookup("RUST_LOG").unwrap_or_default();
        let default_level = lookup("LOG_LEVEL")
            .or_else(|| logging.and_then(|l| l.level.clone()))
            .unwrap_or_else(|| "info".to_string());
        let log_format = lookup("LOG_FORMAT")
            .or_else(|| logging.and_then(|l| l.format.clone()))
            .map(|f| LogFormat::parse(&f))
            .unwrap_or(LogFormat::Human);
        Self {
            log_filter,
            default_level,
            log_format,
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.log_filter.is_empty() {
            EnvFilter::new(&self.default_level)
        } else {
            EnvFilter::new(&self.log_filter)
        }
    }
}

/// Initialize logging
///
/// Safe to call multiple times - will only initialize once.
pub fn init_logging(config: &TelemetryConfig) {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Human => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    // try_init: another thread may have set the subscriber since the check
    let _ = tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init();
}
