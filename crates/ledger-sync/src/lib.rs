//! Ledger synchronization for the expense tracker.
//!
//! [`LedgerSyncEngine`] keeps an optimistic cache of the signed-in user's
//! records in front of a [`LedgerStore`]. Local intents are visible at once
//! and reconciled with the store's answer; observers follow the published
//! [`Ledger`] through a watch channel.

mod cache;
mod engine;
mod entry;
mod error;
mod live;
mod realtime_db;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheMiss, EntryTag, LedgerCache};
pub use engine::{DeleteOutcome, Ledger, LedgerSyncEngine, SyncStatus};
pub use entry::{is_sentinel, Category, EntryDraft, EntryPatch, LedgerEntry, NewEntry, SENTINEL_PREFIX};
pub use error::{SyncError, SyncResult};
pub use live::LiveSubscription;
pub use realtime_db::RealtimeLedgerStore;
pub use store::{LedgerStore, SyncContext};
