//! High-level API over the token store.

use crate::{StorageKeys, StorageResult, StoreWrite, TokenStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Seconds of remaining validity below which a stored token counts as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Credentials of a signed-in user as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub verified: bool,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Whether the token is expired (or about to be) at `now`.
    ///
    /// A session without a recorded expiry never expires locally; the
    /// provider rejects it on the next remote call instead.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.signed_duration_since(now).num_seconds() < EXPIRY_SKEW_SECS,
            None => false,
        }
    }
}

/// Typed access to session credentials and the theme preference.
pub struct CredentialStore {
    storage: Box<dyn TokenStore>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Create a credential store with the given backend
    pub fn new(storage: Box<dyn TokenStore>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    // ==========================================
    // Session
    // ==========================================

    /// Persist a complete session. Either every key lands or none does.
    pub fn persist_session(&self, session: &StoredSession) -> StorageResult<()> {
        let _guard = self.write_lock.lock();

        let mut writes = vec![
            StoreWrite::set(StorageKeys::TOKEN, session.token.as_str()),
            StoreWrite::set(StorageKeys::USER_ID, session.user_id.as_str()),
            StoreWrite::set(StorageKeys::VERIFIED_FLAG, bool_value(session.verified)),
        ];
        writes.push(optional_write(StorageKeys::EMAIL, session.email.clone()));
        writes.push(optional_write(
            StorageKeys::TOKEN_ISSUED_AT,
            session.issued_at.map(|t| t.to_rfc3339()),
        ));
        writes.push(optional_write(
            StorageKeys::TOKEN_EXPIRES_AT,
            session.expires_at.map(|t| t.to_rfc3339()),
        ));

        self.storage.apply(&writes)?;
        tracing::debug!(user_id = %session.user_id, verified = session.verified, "session persisted");
        Ok(())
    }

    /// Load the persisted session, if any.
    ///
    /// A token without a user id (or the reverse) is treated as corrupt: the
    /// leftovers are cleared and `None` is returned.
    pub fn load_session(&self) -> StorageResult<Option<StoredSession>> {
        let token = self.storage.get(StorageKeys::TOKEN)?;
        let user_id = self.storage.get(StorageKeys::USER_ID)?;

        let (token, user_id) = match (token, user_id) {
            (Some(token), Some(user_id)) => (token, user_id),
            (None, None) => return Ok(None),
            _ => {
                tracing::warn!("incomplete stored session, clearing credentials");
                self.clear_session()?;
                return Ok(None);
            }
        };

        Ok(Some(StoredSession {
            token,
            user_id,
            email: self.storage.get(StorageKeys::EMAIL)?,
            verified: self.storage.get(StorageKeys::VERIFIED_FLAG)?.as_deref() == Some("true"),
            issued_at: self.timestamp(StorageKeys::TOKEN_ISSUED_AT)?,
            expires_at: self.timestamp(StorageKeys::TOKEN_EXPIRES_AT)?,
        }))
    }

    /// Remove every session key. The theme preference is kept.
    pub fn clear_session(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let writes: Vec<StoreWrite> = StorageKeys::SESSION_KEYS
            .iter()
            .map(|key| StoreWrite::remove(key))
            .collect();
        self.storage.apply(&writes)
    }

    /// Check if a session token is stored
    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.storage.has(StorageKeys::TOKEN)? && self.storage.has(StorageKeys::USER_ID)?)
    }

    /// Record the verification flag of the stored session.
    ///
    /// Does nothing when no session is stored, so a late verification result
    /// cannot recreate credentials after logout.
    pub fn set_verified(&self, verified: bool) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        if !self.storage.has(StorageKeys::TOKEN)? {
            return Ok(());
        }
        self.storage.set(StorageKeys::VERIFIED_FLAG, bool_value(verified))
    }

    // ==========================================
    // Theme
    // ==========================================

    /// Stored theme mode name, if any
    pub fn theme_mode(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::THEME_MODE)
    }

    /// Store the theme mode name
    pub fn set_theme_mode(&self, mode: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.storage.set(StorageKeys::THEME_MODE, mode)
    }

    fn timestamp(&self, key: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unparseable stored timestamp");
                Ok(None)
            }
        }
    }
}

fn bool_value(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn optional_write(key: &str, value: Option<String>) -> StoreWrite {
    match value {
        Some(value) => StoreWrite::set(key, value),
        None => StoreWrite::remove(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageError};
    use chrono::Duration;

    fn store() -> CredentialStore {
        CredentialStore::new(Box::new(MemoryStorage::new()))
    }

    fn session(verified: bool) -> StoredSession {
        let now = Utc::now();
        StoredSession {
            token: "id-token-1".to_string(),
            user_id: "uid-1".to_string(),
            email: Some("a@b.co".to_string()),
            verified,
            issued_at: Some(now),
            expires_at: Some(now + Duration::hours(1)),
        }
    }

    #[test]
    fn test_persist_and_load_session() {
        let store = store();
        assert_eq!(store.load_session().unwrap(), None);

        let stored = session(true);
        store.persist_session(&stored).unwrap();

        let loaded = store.load_session().unwrap().unwrap();
        assert_eq!(loaded.token, "id-token-1");
        assert_eq!(loaded.user_id, "uid-1");
        assert!(loaded.verified);
        // RFC 3339 keeps sub-second precision
        assert_eq!(loaded.expires_at, stored.expires_at);
        assert!(store.has_session().unwrap());
    }

    #[test]
    fn test_clear_session_keeps_theme() {
        let store = store();
        store.set_theme_mode("dark").unwrap();
        store.persist_session(&session(false)).unwrap();

        store.clear_session().unwrap();

        assert_eq!(store.load_session().unwrap(), None);
        assert!(!store.has_session().unwrap());
        assert_eq!(store.theme_mode().unwrap(), Some("dark".to_string()));
    }

    #[test]
    fn test_incomplete_session_is_cleared() {
        let backend = MemoryStorage::new();
        backend.set(StorageKeys::TOKEN, "orphan-token").unwrap();
        let store = CredentialStore::new(Box::new(backend));

        assert_eq!(store.load_session().unwrap(), None);
        assert!(!store.has_session().unwrap());
    }

    #[test]
    fn test_set_verified_without_session_is_noop() {
        let store = store();
        store.set_verified(true).unwrap();
        assert_eq!(store.load_session().unwrap(), None);

        store.persist_session(&session(false)).unwrap();
        store.set_verified(true).unwrap();
        assert!(store.load_session().unwrap().unwrap().verified);
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let mut stored = session(true);
        assert!(!stored.is_expired_at(now));

        stored.expires_at = Some(now - Duration::minutes(5));
        assert!(stored.is_expired_at(now));

        stored.expires_at = Some(now + Duration::seconds(10));
        assert!(stored.is_expired_at(now), "inside the skew window counts as expired");

        stored.expires_at = None;
        assert!(!stored.is_expired_at(now));
    }

    #[test]
    fn test_failed_batch_leaves_previous_session() {
        let backend = MemoryStorage::new();
        let store = CredentialStore::new(Box::new(backend.clone()));
        store.persist_session(&session(true)).unwrap();

        backend.fail_writes(true);
        let mut replacement = session(false);
        replacement.token = "id-token-2".to_string();
        replacement.user_id = "uid-2".to_string();
        assert!(matches!(
            store.persist_session(&replacement),
            Err(StorageError::Backend(_))
        ));

        backend.fail_writes(false);
        let loaded = store.load_session().unwrap().unwrap();
        assert_eq!(loaded.token, "id-token-1");
        assert_eq!(loaded.user_id, "uid-1");
    }
}
