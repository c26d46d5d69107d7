//! # Observability
//!
//! Centralized logging layer for the expense tracker workspace.
//!
//! Crates in this workspace are **log producers** only. They use the standard
//! `tracing` macros and never decide where logs go. The binary calls
//! [`init_with_config`] once at startup, which installs:
//!
//! - a JSONL file layer (`~/.expense-tracker/logs/tracker.jsonl` by default)
//!   with credential-like fields redacted,
//! - an optional compact stderr layer for foreground feedback,
//! - an `EnvFilter` driven by `RUST_LOG`, falling back to the configured level.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("expense-tracker").ok();
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry, REDACTED_FIELDS};
pub use writer::{FileLogWriter, WriterFactory};

/// Output format for the stderr layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per line (same shape as the file layer).
    Json,
}

impl LogFormat {
    /// Parse a format name, defaulting to compact for unknown values.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default level filter, overridden by `RUST_LOG`.
    pub default_level: String,

    /// Custom log file path. Defaults to `~/.expense-tracker/logs/tracker.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Disable the file layer entirely.
    pub file_enabled: bool,

    /// Also emit logs to stderr.
    pub also_stderr: bool,

    /// Format of the stderr layer.
    pub stderr_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            file_enabled: true,
            also_stderr: false,
            stderr_format: LogFormat::Compact,
        }
    }
}

/// Default central log file location.
pub fn default_log_path() -> io::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".expense-tracker").join("logs").join("tracker.jsonl"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with a custom configuration.
///
/// Returns an error when the log file cannot be opened or a global subscriber
/// has already been installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let (file_layer, log_path) = if config.file_enabled {
        let log_path = match config.log_path.clone() {
            Some(path) => path,
            None => default_log_path()?,
        };
        let writer = FileLogWriter::new(&log_path)?;
        let layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
            .with_filter(env_filter());
        (Some(layer), Some(log_path))
    } else {
        (None, None)
    };

    let stderr_compact = (config.also_stderr && config.stderr_format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter())
    });

    let stderr_json = (config.also_stderr && config.stderr_format == LogFormat::Json).then(|| {
        JsonLayer::new(config.service_name.clone(), io::stderr).with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_compact)
        .with(stderr_json)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    if let Some(path) = log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }
    Ok(())
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.file_enabled);
        assert!(!config.also_stderr);
        assert_eq!(config.stderr_format, LogFormat::Compact);
    }

    #[test]
    fn test_log_format_from_name() {
        assert_eq!(LogFormat::from_name("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_name(" JSONL "), LogFormat::Json);
        assert_eq!(LogFormat::from_name("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_name("whatever"), LogFormat::Compact);
    }
}
