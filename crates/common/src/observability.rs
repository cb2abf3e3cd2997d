//! Logging setup for Sentinel ACME processes
//!
//! The library crates only emit `tracing` events; embedding binaries call
//! [`init_tracing`] once at startup to install a subscriber.

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Structured JSON, one object per line
    Json,
    /// Multi-line human readable output for development
    Pretty,
    /// Single-line human readable output
    #[default]
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. `info`, `sentinel_acme=debug`).
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Build the env filter, preferring `RUST_LOG` over the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Initialize the tracing subscriber
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is left in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let json_layer = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let pretty_layer = (config.format == LogFormat::Pretty)
        .then(|| fmt::layer().pretty().with_target(true));

    let compact_layer =
        (config.format == LogFormat::Compact).then(|| fmt::layer().compact().with_target(false));

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(json_layer)
        .with(pretty_layer)
        .with(compact_layer)
        .try_init()
        .is_ok();

    if installed {
        info!(level = %config.level, format = ?config.format, "Tracing initialized");
    }
    installed
}
