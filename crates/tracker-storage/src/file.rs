//! JSON file storage backend.
//!
//! The whole key space lives in one JSON object. Every write produces a new
//! document in a sibling temp file which is then renamed over the original,
//! so readers never observe a half-written batch.

use crate::{StorageResult, StoreWrite, TokenStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable backend persisting to a single JSON file.
pub struct FileStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, creating parent directories. A missing file
    /// is an empty store.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = data.len(), "file storage opened");
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(data)?;
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Apply `f` to a copy of the document and commit it only if the file
    /// write succeeds.
    fn update<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> StorageResult<T> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        let result = f(&mut next);
        self.write_document(&next)?;
        *data = next;
        Ok(result)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StorageResult<()> {
    Ok(())
}

impl TokenStore for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        if !self.data.lock().contains_key(key) {
            return Ok(false);
        }
        self.update(|data| data.remove(key).is_some())
    }

    fn apply(&self, writes: &[StoreWrite]) -> StorageResult<()> {
        self.update(|data| {
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
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("token", "abc").unwrap();
        storage.set("userId", "uid").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap(), Some("abc".to_string()));
        assert_eq!(reopened.get("userId").unwrap(), Some("uid".to_string()));
    }

    #[test]
    fn test_remove_missing_key_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let storage = FileStorage::open(&path).unwrap();
        assert!(!storage.remove("token").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_apply_writes_single_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("themeMode", "dark").unwrap();
        storage
            .apply(&[
                StoreWrite::set("token", "t"),
                StoreWrite::set("userId", "u"),
                StoreWrite::remove("themeMode"),
            ])
            .unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk["token"], "t");
        assert!(!dir.path().join("credentials.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(FileStorage::open(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("token", "t").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
