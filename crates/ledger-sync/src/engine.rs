//! Ledger sync engine: optimistic local cache in front of the remote record store.
//!
//! Every mutation is applied to the cache first and published, then sent to
//! the store. The store's answer either confirms the local intent or rolls it
//! back (creates and updates). Deletes never roll back.
//!
//! The engine is bound to one session epoch at a time. `reset` (logout,
//! expiry) bumps an internal generation; requests that started under an older
//! generation finish without touching the cache.

use crate::cache::{CacheMiss, LedgerCache};
use crate::entry::{is_sentinel, EntryDraft, EntryPatch, LedgerEntry, SENTINEL_PREFIX};
use crate::store::{LedgerStore, SyncContext};
use crate::{SyncError, SyncResult};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{debug, info, warn};
use tracker_config_and_utils::ErrorKind;
use uuid::Uuid;

/// Aggregate sync activity of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    /// A full reload is running.
    Loading,
    /// At least one local intent awaits the store.
    Syncing,
    /// The last remote call failed; cleared by the next success.
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Loading => "loading",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    /// Visible entries, newest first.
    pub entries: Vec<LedgerEntry>,
    pub total: Decimal,
    pub premium_activated: bool,
    /// Latched once `total` exceeded the premium threshold in this session.
    pub threshold_crossed: bool,
    pub sync_status: SyncStatus,
    /// Ids with a local intent in flight.
    pub pending_ids: Vec<String>,
    pub last_error: Option<ErrorKind>,
}

/// What a delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed locally and remotely.
    Deleted,
    /// Unknown id or a delete already in flight.
    NoOp,
    /// Removed locally; the store rejected the delete.
    LocalOnly { error: ErrorKind },
}

#[derive(Default)]
struct EngineState {
    cache: LedgerCache,
    generation: u64,
    /// Session epoch the ledger currently belongs to.
    session_epoch: Option<u64>,
    /// Contexts older than this belong to a session that was torn down.
    epoch_floor: u64,
    premium_activated: bool,
    threshold_crossed: bool,
    in_flight: usize,
    loading: usize,
    failed: bool,
    last_error: Option<ErrorKind>,
    /// Sentinel id -> durable id, for intents queued behind a create. Kept
    /// only while someone still holds or waits on the sentinel's lock.
    aliases: HashMap<String, String>,
}

impl EngineState {
    fn teardown(&mut self) {
        self.generation += 1;
        self.cache.clear();
        self.aliases.clear();
        self.premium_activated = false;
        self.threshold_crossed = false;
        self.in_flight = 0;
        self.loading = 0;
        self.failed = false;
        self.last_error = None;
    }

    /// Attach to the session of `ctx`. Returns the current generation.
    fn bind(&mut self, ctx: &SyncContext) -> SyncResult<u64> {
        ctx.ensure_active()?;
        if ctx.epoch < self.epoch_floor {
            return Err(SyncError::StaleSession);
        }
        match self.session_epoch {
            Some(epoch) if ctx.epoch < epoch => return Err(SyncError::StaleSession),
            Some(epoch) if ctx.epoch == epoch => {}
            Some(epoch) => {
                info!(from = epoch, to = ctx.epoch, "ledger switching session");
                self.teardown();
                self.session_epoch = Some(ctx.epoch);
            }
            None => self.session_epoch = Some(ctx.epoch),
        }
        Ok(self.generation)
    }

    fn resolve(&self, id: &str) -> String {
        self.aliases
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn sync_status(&self) -> SyncStatus {
        if self.loading > 0 {
            SyncStatus::Loading
        } else if self.in_flight > 0 {
            SyncStatus::Syncing
        } else if self.failed {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        }
    }

    fn succeeded(&mut self) {
        self.failed = false;
        self.last_error = None;
    }

    fn failed_with(&mut self, error: &SyncError) {
        self.failed = true;
        self.last_error = Some(error.kind());
    }

    fn finish_intent(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn latch_threshold(&mut self, threshold: Decimal) {
        if !self.threshold_crossed && self.cache.total() > threshold {
            info!(threshold = %threshold, "ledger total crossed premium threshold");
            self.threshold_crossed = true;
        }
    }

    fn snapshot(&self) -> Ledger {
        Ledger {
            entries: self.cache.entries(),
            total: self.cache.total(),
            premium_activated: self.premium_activated,
            threshold_crossed: self.threshold_crossed,
            sync_status: self.sync_status(),
            pending_ids: self.cache.in_flight_ids(),
            last_error: self.last_error,
        }
    }
}

/// Holds the per-id lock; prunes the lock table when the last holder leaves,
/// together with the alias of a sentinel nobody waits on any more.
struct EntryGuard<'a> {
    engine: &'a LedgerSyncEngine,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let pruned = {
            let mut locks = self.engine.locks.lock();
            if locks
                .get(&self.id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&self.id);
                true
            } else {
                false
            }
        };
        if pruned && is_sentinel(&self.id) {
            self.engine.state.lock().aliases.remove(&self.id);
        }
    }
}

/// Cache, remote store and published ledger state for one user at a time.
pub struct LedgerSyncEngine {
    store: Arc<dyn LedgerStore>,
    threshold: Decimal,
    state: Mutex<EngineState>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tx: watch::Sender<Ledger>,
}

impl LedgerSyncEngine {
    pub fn new(store: Arc<dyn LedgerStore>, threshold: Decimal) -> Self {
        let (tx, _) = watch::channel(Ledger::default());
        Self {
            store,
            threshold,
            state: Mutex::new(EngineState::default()),
            locks: Mutex::new(HashMap::new()),
            tx,
        }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn subscribe(&self) -> watch::Receiver<Ledger> {
        self.tx.subscribe()
    }

    /// Current ledger view, computed fresh from the cache.
    pub fn snapshot(&self) -> Ledger {
        self.state.lock().snapshot()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().cache.entries()
    }

    /// Sum of all visible amounts, including optimistic ones.
    pub fn total(&self) -> Decimal {
        self.state.lock().cache.total()
    }

    pub fn get(&self, id: &str) -> Option<LedgerEntry> {
        let state = self.state.lock();
        state.cache.get(&state.resolve(id)).cloned()
    }

    pub fn premium_activated(&self) -> bool {
        self.state.lock().premium_activated
    }

    fn publish(&self, state: &EngineState) {
        self.tx.send_replace(state.snapshot());
    }

    async fn lock_entry(&self, id: &str) -> EntryGuard<'_> {
        let lock = self.locks.lock().entry(id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        EntryGuard {
            engine: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Lock the record `id` refers to, following a sentinel to its durable id
    /// if the create finished while we were queued.
    async fn lock_resolved(&self, id: &str) -> (String, EntryGuard<'_>) {
        let mut target = self.state.lock().resolve(id);
        loop {
            let guard = self.lock_entry(&target).await;
            let current = self.state.lock().resolve(id);
            if current == target {
                return (target, guard);
            }
            debug!(record_id = %id, resolved = %current, "following created record");
            target = current;
        }
    }

    // ==========================================
    // Operations
    // ==========================================

    /// Replace the cache with the store's collection.
    ///
    /// Entries with a local intent in flight keep their local view. On failure
    /// the cache is left untouched.
    pub async fn load(&self, ctx: &SyncContext) -> SyncResult<()> {
        let generation = {
            let mut state = self.state.lock();
            let generation = state.bind(ctx)?;
            state.loading += 1;
            self.publish(&state);
            generation
        };

        let result = self.store.list(ctx).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("discarding load result from previous session");
            return Err(SyncError::SessionChanged);
        }
        state.loading = state.loading.saturating_sub(1);
        match result {
            Ok(entries) => {
                debug!(count = entries.len(), "ledger loaded");
                state.cache.replace_all(entries);
                state.succeeded();
                state.latch_threshold(self.threshold);
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "ledger load failed");
                state.failed_with(&e);
                self.publish(&state);
                Err(e)
            }
        }
    }

    /// Add a record. The entry is visible immediately under a `local-` id and
    /// replaced by the durable record once the store accepts it.
    pub async fn create(&self, ctx: &SyncContext, draft: EntryDraft) -> SyncResult<LedgerEntry> {
        let new_entry = draft.validate(Utc::now())?;
        let sentinel = format!("{}{}", SENTINEL_PREFIX, Uuid::new_v4());
        let _guard = self.lock_entry(&sentinel).await;

        let generation = {
            let mut state = self.state.lock();
            let generation = state.bind(ctx)?;
            state
                .cache
                .insert_pending(new_entry.clone().with_id(sentinel.clone()));
            state.in_flight += 1;
            state.latch_threshold(self.threshold);
            self.publish(&state);
            generation
        };

        let result = self.store.create(ctx, &new_entry).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            info!(record_id = %sentinel, "session changed during create, discarding result");
            return Err(SyncError::SessionChanged);
        }
        state.finish_intent();
        match result {
            Ok(id) => {
                let entry = new_entry.with_id(id.clone());
                state.cache.confirm_create(&sentinel, entry.clone());
                state.aliases.insert(sentinel, id.clone());
                state.succeeded();
                state.latch_threshold(self.threshold);
                self.publish(&state);
                info!(record_id = %id, amount = %entry.amount, "record created");
                Ok(entry)
            }
            Err(e) => {
                state.cache.remove(&sentinel);
                state.failed_with(&e);
                self.publish(&state);
                warn!(error = %e, "record create failed, local entry removed");
                Err(e)
            }
        }
    }

    /// Edit a record. On rejection the exact pre-edit entry is restored.
    pub async fn update(
        &self,
        ctx: &SyncContext,
        id: &str,
        patch: EntryPatch,
    ) -> SyncResult<LedgerEntry> {
        let patch = patch.validate()?;
        self.state.lock().bind(ctx)?;

        let (target, _guard) = self.lock_resolved(id).await;

        let (generation, updated) = {
            let mut state = self.state.lock();
            let generation = state.bind(ctx)?;
            let updated = match state.cache.begin_update(&target, &patch) {
                Ok(updated) => updated,
                Err(CacheMiss::Unknown) => return Err(SyncError::NotFound(id.to_string())),
                Err(CacheMiss::Deleted) => {
                    return Err(SyncError::Conflict(format!("record {} is being deleted", id)))
                }
            };
            state.in_flight += 1;
            state.latch_threshold(self.threshold);
            self.publish(&state);
            (generation, updated)
        };

        let result = self.store.update(ctx, &updated).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            info!(record_id = %target, "session changed during update, discarding result");
            return Err(SyncError::SessionChanged);
        }
        state.finish_intent();
        match result {
            Ok(()) => {
                state.cache.confirm(&target);
                state.succeeded();
                self.publish(&state);
                info!(record_id = %target, "record updated");
                Ok(updated)
            }
            Err(e) => {
                state.cache.revert(&target);
                state.failed_with(&e);
                self.publish(&state);
                warn!(record_id = %target, error = %e, "record update failed, restored previous value");
                Err(e)
            }
        }
    }

    /// Remove a record. The entry disappears immediately and stays gone even
    /// when the store rejects the delete; the rejection is reported in the
    /// outcome and in `last_error`.
    pub async fn delete(&self, ctx: &SyncContext, id: &str) -> SyncResult<DeleteOutcome> {
        {
            let mut state = self.state.lock();
            state.bind(ctx)?;
            let target = state.resolve(id);
            if state.cache.get(&target).is_none() {
                debug!(record_id = %id, "delete of unknown or deleting record ignored");
                return Ok(DeleteOutcome::NoOp);
            }
        }

        let (target, _guard) = self.lock_resolved(id).await;

        let generation = {
            let mut state = self.state.lock();
            let generation = state.bind(ctx)?;
            if state.cache.mark_deleted(&target).is_none() {
                return Ok(DeleteOutcome::NoOp);
            }
            state.in_flight += 1;
            self.publish(&state);
            generation
        };

        let result = self.store.delete(ctx, &target).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            info!(record_id = %target, "session changed during delete, discarding result");
            return Err(SyncError::SessionChanged);
        }
        state.finish_intent();
        state.cache.remove(&target);
        let outcome = match result {
            Ok(()) => {
                state.succeeded();
                info!(record_id = %target, "record deleted");
                DeleteOutcome::Deleted
            }
            Err(e) => {
                warn!(record_id = %target, error = %e, "remote delete failed, keeping local removal");
                state.failed_with(&e);
                DeleteOutcome::LocalOnly { error: e.kind() }
            }
        };
        self.publish(&state);
        Ok(outcome)
    }

    /// Turn premium on for the rest of the session.
    ///
    /// Allowed once the total has exceeded the threshold in this session, even
    /// if later deletes brought it back down.
    pub fn activate_premium(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.premium_activated {
            return Ok(());
        }
        if !state.threshold_crossed {
            return Err(SyncError::PremiumLocked);
        }
        state.premium_activated = true;
        self.publish(&state);
        info!("premium activated");
        Ok(())
    }

    /// Drop all session data. Requests still in flight finish without
    /// touching the new state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if let Some(epoch) = state.session_epoch.take() {
            state.epoch_floor = state.epoch_floor.max(epoch + 1);
        }
        state.teardown();
        self.publish(&state);
        debug!(generation = state.generation, "ledger reset");
    }
}
