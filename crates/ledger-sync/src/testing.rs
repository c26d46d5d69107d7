//! Scriptable in-process record store for tests.

use crate::entry::{LedgerEntry, NewEntry};
use crate::store::{LedgerStore, SyncContext};
use crate::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// Record store operations that can be scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Create,
    Update,
    Delete,
}

/// Pauses one store call until released.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the held call has reached the store.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct StoreState {
    records: HashMap<String, BTreeMap<String, LedgerEntry>>,
    revoked_tokens: HashSet<String>,
    failures: HashMap<StoreOp, VecDeque<SyncError>>,
    gates: HashMap<StoreOp, Gate>,
    reply_gates: HashMap<StoreOp, Gate>,
    calls: HashMap<StoreOp, usize>,
    next_id: u64,
}

/// In-memory record store keyed by user id, with injectable failures and
/// call gates.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<StoreState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put records for `user_id` directly, as if written by another client.
    pub fn seed(&self, user_id: &str, entries: Vec<LedgerEntry>) {
        let mut state = self.state.lock();
        let records = state.records.entry(user_id.to_string()).or_default();
        for entry in entries {
            records.insert(entry.id.clone(), entry);
        }
    }

    /// Remove a record behind the engine's back.
    pub fn remove_record(&self, user_id: &str, id: &str) {
        if let Some(records) = self.state.lock().records.get_mut(user_id) {
            records.remove(id);
        }
    }

    /// Current records of `user_id`, ordered by id.
    pub fn records(&self, user_id: &str) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .records
            .get(user_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Reject every later call made with `token`.
    pub fn revoke_token(&self, token: &str) {
        self.state.lock().revoked_tokens.insert(token.to_string());
    }

    /// Make the next call of `op` fail with `error`. Failures queue up.
    pub fn fail_next(&self, op: StoreOp, error: SyncError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Hold the next call of `op` until the returned gate is released.
    pub fn hold_next(&self, op: StoreOp) -> Gate {
        let gate = Gate::default();
        self.state.lock().gates.insert(op, gate.clone());
        gate
    }

    /// Let the next call of `op` apply its write, then hold the answer until
    /// the returned gate is released.
    pub fn hold_next_reply(&self, op: StoreOp) -> Gate {
        let gate = Gate::default();
        self.state.lock().reply_gates.insert(op, gate.clone());
        gate
    }

    /// Number of calls made for `op` (including failed ones).
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp, ctx: &SyncContext) -> SyncResult<()> {
        let (gate, failure) = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;
            let gate = state.gates.remove(&op);
            let failure = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (gate, failure)
        };

        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if self.state.lock().revoked_tokens.contains(&ctx.token) {
            return Err(SyncError::ExpiredSession);
        }
        Ok(())
    }

    async fn reply(&self, op: StoreOp) {
        let gate = self.state.lock().reply_gates.remove(&op);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn list(&self, ctx: &SyncContext) -> SyncResult<Vec<LedgerEntry>> {
        self.enter(StoreOp::List, ctx).await?;
        Ok(self.records(&ctx.user_id))
    }

    async fn create(&self, ctx: &SyncContext, entry: &NewEntry) -> SyncResult<String> {
        self.enter(StoreOp::Create, ctx).await?;
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = format!("rec-{:06}", state.next_id);
            state
                .records
                .entry(ctx.user_id.clone())
                .or_default()
                .insert(id.clone(), entry.clone().with_id(id.clone()));
            id
        };
        self.reply(StoreOp::Create).await;
        Ok(id)
    }

    async fn update(&self, ctx: &SyncContext, entry: &LedgerEntry) -> SyncResult<()> {
        self.enter(StoreOp::Update, ctx).await?;
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(&ctx.user_id)
            .and_then(|records| records.get_mut(&entry.id))
            .ok_or_else(|| SyncError::Conflict(format!("record {} does not exist", entry.id)))?;
        *record = entry.clone();
        Ok(())
    }

    async fn delete(&self, ctx: &SyncContext, id: &str) -> SyncResult<()> {
        self.enter(StoreOp::Delete, ctx).await?;
        self.state
            .lock()
            .records
            .get_mut(&ctx.user_id)
            .and_then(|records| records.remove(id))
            .map(|_| ())
            .ok_or_else(|| SyncError::Conflict(format!("record {} does not exist", id)))
    }
}
