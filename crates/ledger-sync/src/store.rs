//! Remote ledger store interface and the session context it is called with.

use crate::entry::{LedgerEntry, NewEntry};
use crate::{SyncError, SyncResult};
use async_trait::async_trait;
use auth_session::{Session, SessionStatus};

/// Credential and identity for one ledger operation.
///
/// Built from the current session and passed explicitly to every engine and
/// store call.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub token: String,
    pub user_id: String,
    pub status: SessionStatus,
    /// Epoch of the session the credential belongs to.
    pub epoch: u64,
}

impl SyncContext {
    /// Capture the context of `session`, refusing sessions without a credential.
    pub fn from_session(session: &Session) -> SyncResult<Self> {
        match (&session.token, &session.user_id) {
            (Some(token), Some(user_id)) if session.status.has_credentials() => Ok(Self {
                token: token.clone(),
                user_id: user_id.clone(),
                status: session.status,
                epoch: session.epoch,
            }),
            _ => Err(SyncError::NotAuthenticated(session.status)),
        }
    }

    pub(crate) fn ensure_active(&self) -> SyncResult<()> {
        if self.status.has_credentials() {
            Ok(())
        } else {
            Err(SyncError::NotAuthenticated(self.status))
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("status", &self.status)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Authoritative per-user record collection (`/records/{userId}/{recordId}`).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All records of `ctx.user_id`, in store order.
    async fn list(&self, ctx: &SyncContext) -> SyncResult<Vec<LedgerEntry>>;

    /// Persist a new record and return its server-generated id.
    async fn create(&self, ctx: &SyncContext, entry: &NewEntry) -> SyncResult<String>;

    async fn update(&self, ctx: &SyncContext, entry: &LedgerEntry) -> SyncResult<()>;

    async fn delete(&self, ctx: &SyncContext, id: &str) -> SyncResult<()>;
}
