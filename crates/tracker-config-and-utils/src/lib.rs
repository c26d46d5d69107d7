//! Core types, configuration, and utilities for the expense tracker.

mod config;
mod error;
mod kinds;
mod logging;
mod paths;
mod validation;

pub use config::{Config, DEFAULT_LIVE_REFRESH_SECS, DEFAULT_LOG_LEVEL, DEFAULT_PREMIUM_THRESHOLD};
pub use error::{CoreError, CoreResult};
pub use kinds::{ErrorKind, ProviderErrorCode};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
pub use validation::ValidationError;
