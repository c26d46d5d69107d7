//! Logging initialization for the tracker.
//!
//! Thin wrapper over the workspace `observability` crate: every log line goes
//! to `~/.expense-tracker/logs/tracker.jsonl`, optionally mirrored to stderr.

use crate::Paths;
use observability::{LogConfig, LogFormat};

/// Initialize logging for the `expense-tracker` service.
///
/// `TRACKER_LOG_STDERR=0` silences the stderr mirror and
/// `TRACKER_LOG_FORMAT=json` switches it to JSON lines.
pub fn init_logging(level: &str, paths: &Paths) {
    init_logging_for_service("expense-tracker", level, paths);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    let also_stderr = std::env::var("TRACKER_LOG_STDERR")
        .map(|value| !matches!(value.trim(), "0" | "false" | "off"))
        .unwrap_or(true);
    let stderr_format = std::env::var("TRACKER_LOG_FORMAT")
        .map(|value| LogFormat::from_name(&value))
        .unwrap_or_default();

    let result = observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
        stderr_format,
        ..Default::default()
    });

    if let Err(error) = result {
        eprintln!("logging disabled: {}", error);
    }
}
