//! Storage trait definitions.

use crate::StorageResult;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StoreWrite {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        StoreWrite::Set {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn remove(key: &str) -> Self {
        StoreWrite::Remove {
            key: key.to_string(),
        }
    }
}

/// Trait for durable key-value backends.
pub trait TokenStore: Send + Sync {
    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Returns true if the key existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Apply a batch of writes so that either all of them or none are visible.
    fn apply(&self, writes: &[StoreWrite]) -> StorageResult<()>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
