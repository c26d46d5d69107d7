//! Periodic remote reload, standing in for a push listener.

use crate::engine::LedgerSyncEngine;
use crate::store::SyncContext;
use crate::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running reload loop. Dropping it stops the loop.
pub struct LiveSubscription {
    handle: JoinHandle<()>,
}

impl LiveSubscription {
    /// Stop the loop now.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// False once the loop was cancelled or ended on its own (session lost).
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl LedgerSyncEngine {
    /// Reload the ledger every `every` for as long as the returned handle
    /// lives. The first reload runs immediately.
    ///
    /// The loop ends by itself when the session behind `ctx` is gone; other
    /// failures are logged and retried on the next tick.
    pub fn watch_remote(self: &Arc<Self>, ctx: SyncContext, every: Duration) -> LiveSubscription {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match engine.load(&ctx).await {
                    Ok(()) => debug!(user_id = %ctx.user_id, "live reload complete"),
                    Err(e @ SyncError::NotAuthenticated(_)) => {
                        info!(error = %e, "stopping live reload");
                        break;
                    }
                    Err(e) if e.is_session_loss() => {
                        info!(error = %e, "stopping live reload");
                        break;
                    }
                    Err(e) => warn!(error = %e, "live reload failed"),
                }
            }
        });
        LiveSubscription { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Category, LedgerEntry};
    use crate::testing::{InMemoryLedgerStore, StoreOp};
    use auth_session::SessionStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn ctx(epoch: u64) -> SyncContext {
        SyncContext {
            token: "token-1".to_string(),
            user_id: "uid-1".to_string(),
            status: SessionStatus::Authenticated,
            epoch,
        }
    }

    fn record(id: &str, amount: i64) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            amount: Decimal::from(amount),
            description: "remote".to_string(),
            category: Category::Other,
            created_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloads_until_dropped() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = Arc::new(LedgerSyncEngine::new(store.clone(), Decimal::from(10_000)));

        let subscription = engine.watch_remote(ctx(1), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.calls(StoreOp::List), 1);
        assert!(engine.entries().is_empty());

        store.seed("uid-1", vec![record("rec-remote", 70)]);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(engine.total(), Decimal::from(70));
        assert!(subscription.is_active());

        let calls = store.calls(StoreOp::List);
        drop(subscription);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.calls(StoreOp::List), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_expired_session() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = Arc::new(LedgerSyncEngine::new(store.clone(), Decimal::from(10_000)));
        store.revoke_token("token-1");

        let subscription = engine.watch_remote(ctx(1), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!subscription.is_active());
        assert_eq!(store.calls(StoreOp::List), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = Arc::new(LedgerSyncEngine::new(store.clone(), Decimal::from(10_000)));

        let subscription = engine.watch_remote(ctx(1), Duration::from_secs(5));
        subscription.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!subscription.is_active());
    }
}
