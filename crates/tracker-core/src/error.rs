//! Error type for runtime-level operations.

use auth_session::AuthError;
use ledger_sync::SyncError;
use thiserror::Error;
use tracker_config_and_utils::{CoreError, ErrorKind};
use tracker_storage::StorageError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] CoreError),

    /// Dark mode is a premium feature
    #[error("Dark mode requires premium")]
    PremiumRequired,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Auth(e) => e.kind(),
            RuntimeError::Sync(e) => e.kind(),
            RuntimeError::Storage(_) | RuntimeError::Config(_) | RuntimeError::PremiumRequired => {
                ErrorKind::State
            }
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
