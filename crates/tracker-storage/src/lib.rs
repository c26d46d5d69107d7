//! Durable key-value persistence for session credentials and preferences.
//!
//! This crate provides the token store used by the session layer:
//! - [`TokenStore`]: the backend trait (`get` / `set` / `remove` / atomic `apply`)
//! - [`MemoryStorage`]: process-local backend for tests and ephemeral runs
//! - [`FileStorage`]: JSON document on disk, rewritten atomically on every write
//! - [`CredentialStore`]: typed API over the raw keys

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, StoredSession};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::{StoreWrite, TokenStore};

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open a credential store backed by a JSON file at `path`.
pub fn open_credential_store(path: &Path) -> StorageResult<CredentialStore> {
    let storage = FileStorage::open(path)?;
    Ok(CredentialStore::new(Box::new(storage)))
}

/// Create a credential store that lives only as long as the process.
pub fn in_memory_credential_store() -> CredentialStore {
    CredentialStore::new(Box::new(MemoryStorage::new()))
}
