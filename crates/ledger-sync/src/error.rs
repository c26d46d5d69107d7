//! Error types for ledger synchronization.

use auth_session::SessionStatus;
use thiserror::Error;
use tracker_config_and_utils::{ErrorKind, ProviderErrorCode, ValidationError};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Draft or patch violates an entry invariant
    #[error("Invalid entry: {0}")]
    Validation(#[from] ValidationError),

    /// The session holds no usable credential
    #[error("Ledger requires a signed-in session (session is {0})")]
    NotAuthenticated(SessionStatus),

    /// Context from an older session than the one the ledger is bound to
    #[error("Stale session context")]
    StaleSession,

    /// The ledger was reset (logout, new session) while the request was in
    /// flight; its result was discarded
    #[error("Session changed while the request was in flight")]
    SessionChanged,

    /// Premium activation before the ledger ever crossed the threshold
    #[error("Premium is not available yet")]
    PremiumLocked,

    /// Record not present locally or remotely
    #[error("Record {0} not found")]
    NotFound(String),

    /// Remote record vanished or changed concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The remote store rejected the credential
    #[error("Session expired")]
    ExpiredSession,

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response not covered by a more specific variant
    #[error("Remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Undecodable remote payload
    #[error("Invalid remote payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::NotAuthenticated(_)
            | SyncError::StaleSession
            | SyncError::SessionChanged
            | SyncError::PremiumLocked => ErrorKind::State,
            SyncError::NotFound(_) | SyncError::Conflict(_) => ErrorKind::Conflict,
            SyncError::ExpiredSession => ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession),
            SyncError::Network(_)
            | SyncError::Remote { .. }
            | SyncError::Http(_)
            | SyncError::Json(_) => ErrorKind::Network,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Remote { status, .. } => *status >= 500,
            SyncError::Http(e) => {
                e.is_connect() || e.is_timeout() || e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// True when the operation lost its session rather than failing on its own.
    pub fn is_session_loss(&self) -> bool {
        matches!(
            self,
            SyncError::SessionChanged | SyncError::StaleSession | SyncError::ExpiredSession
        )
    }
}

/// Result type for ledger operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            SyncError::Validation(ValidationError::new("amount", "bad")).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SyncError::NotAuthenticated(SessionStatus::Anonymous).kind(),
            ErrorKind::State
        );
        assert_eq!(SyncError::NotFound("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            SyncError::ExpiredSession.kind(),
            ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession)
        );
        assert_eq!(
            SyncError::Remote {
                status: 503,
                message: "unavailable".into()
            }
            .kind(),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_transient() {
        assert!(SyncError::Network("reset".into()).is_transient());
        assert!(SyncError::Remote {
            status: 502,
            message: String::new()
        }
        .is_transient());
        assert!(!SyncError::Remote {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!SyncError::Conflict("gone".into()).is_transient());
    }

    #[test]
    fn test_not_authenticated_message_names_status() {
        let err = SyncError::NotAuthenticated(SessionStatus::Authenticating);
        assert!(err.to_string().contains("authenticating"));
    }
}
