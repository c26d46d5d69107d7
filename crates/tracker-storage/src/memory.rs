//! In-memory storage backend.

use crate::{StorageError, StorageResult, StoreWrite, TokenStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-local backend. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("memory storage is read-only".to_string()));
        }
        Ok(())
    }
}

impl TokenStore for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_writable()?;
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.data.lock().remove(key).is_some())
    }

    fn apply(&self, writes: &[StoreWrite]) -> StorageResult<()> {
        self.check_writable()?;
        let mut data = self.data.lock();
        for write in writes {
            match write {
                StoreWrite::Set { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                StoreWrite::Remove { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }
}
