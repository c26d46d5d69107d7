//! Authentication error types.

use thiserror::Error;
use tracker_config_and_utils::{ErrorKind, ProviderErrorCode, ValidationError};

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Caller-supplied credentials or profile data are malformed
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The auth provider rejected the request
    #[error("{}", code.user_message())]
    Provider {
        code: ProviderErrorCode,
        /// Raw provider detail, for logs only
        detail: String,
    },

    /// Transport failure before a provider answer arrived
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a body we could not interpret
    #[error("Unexpected provider response: {0}")]
    Protocol(String),

    /// No credential is held by the session
    #[error("Not logged in")]
    NotLoggedIn,

    /// A sign-in or sign-up is already in flight
    #[error("Authentication already in progress")]
    AttemptInProgress,

    /// The session changed (logout, new login) while the request was in flight;
    /// its result was discarded
    #[error("Session changed while the request was in flight")]
    Superseded,

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] tracker_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    pub fn provider(code: ProviderErrorCode, detail: impl Into<String>) -> Self {
        AuthError::Provider {
            code,
            detail: detail.into(),
        }
    }

    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::Provider { code, .. } => ErrorKind::AuthProvider(*code),
            AuthError::Network(_) | AuthError::Http(_) => ErrorKind::Network,
            AuthError::Protocol(_) => ErrorKind::AuthProvider(ProviderErrorCode::Unknown),
            AuthError::NotLoggedIn
            | AuthError::AttemptInProgress
            | AuthError::Superseded
            | AuthError::InvalidStateTransition(_)
            | AuthError::Storage(_) => ErrorKind::State,
        }
    }

    /// Provider code, when the provider produced this error.
    pub fn provider_code(&self) -> Option<ProviderErrorCode> {
        match self.kind() {
            ErrorKind::AuthProvider(code) => Some(code),
            _ => None,
        }
    }

    /// Returns true when the provider says the credential is no longer valid.
    pub fn is_expired_session(&self) -> bool {
        self.provider_code() == Some(ProviderErrorCode::ExpiredSession)
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network failures
    /// - HTTP errors with 5xx status codes
    /// - Provider throttling
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Provider {
                code: ProviderErrorCode::RateLimited,
                ..
            } => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Returns true if a failed sign-in with this error cannot be resolved by
    /// simply retrying with other input. Such failures park the session in
    /// `Failed` until acknowledged.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthProvider(ProviderErrorCode::Unknown) | ErrorKind::State
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
