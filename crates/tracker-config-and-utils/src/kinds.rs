//! Error taxonomy shared by the session and ledger crates.
//!
//! Each crate keeps its own `thiserror` enum; `kind()` on those enums maps
//! into [`ErrorKind`] so consumers can render any failure uniformly and the
//! session can record the last failure without holding the error itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated auth provider rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    InvalidCredentials,
    AlreadyExists,
    RateLimited,
    ExpiredSession,
    Unknown,
}

impl ProviderErrorCode {
    /// Message that is safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderErrorCode::InvalidCredentials => "Invalid email or password.",
            ProviderErrorCode::AlreadyExists => "An account with this email already exists.",
            ProviderErrorCode::RateLimited => "Too many requests. Please try again later.",
            ProviderErrorCode::ExpiredSession => "Session expired. Please log in again.",
            ProviderErrorCode::Unknown => "Something went wrong. Try again later.",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorCode::InvalidCredentials => "invalid_credentials",
            ProviderErrorCode::AlreadyExists => "already_exists",
            ProviderErrorCode::RateLimited => "rate_limited",
            ProviderErrorCode::ExpiredSession => "expired_session",
            ProviderErrorCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum ErrorKind {
    /// Caller-supplied data violates an invariant. Never retried.
    Validation,
    /// The auth provider rejected the request.
    AuthProvider(ProviderErrorCode),
    /// Transport failure. The caller may re-invoke.
    Network,
    /// The remote resource vanished or changed concurrently. Resolve by reloading.
    Conflict,
    /// Operation invoked in a state that does not permit it.
    State,
}

impl ErrorKind {
    /// True for failures that happen before any network call.
    pub fn is_local(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::State)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::AuthProvider(code) => write!(f, "auth_provider({})", code),
            ErrorKind::Network => f.write_str("network"),
            ErrorKind::Conflict => f.write_str("conflict"),
            ErrorKind::State => f.write_str("state"),
        }
    }
}
