//! In-memory ledger cache with per-entry optimistic state.
//!
//! Each slot carries a tag:
//! - `Pending { before }`: a local intent awaits the remote answer. `before`
//!   is the exact pre-mutation entry (`None` for a create), used for rollback.
//! - `Confirmed`: matches what the remote store last acknowledged.
//! - `Deleted`: removed locally, remote delete in flight. Hidden from every view.
//!
//! While a create is in flight, a reload may already contain the record the
//! store saved for it. Remote ids the cache has never seen are therefore held
//! back until no create is pending, so a record is never shown twice.

use crate::entry::{EntryPatch, LedgerEntry};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTag {
    Pending { before: Option<LedgerEntry> },
    Confirmed,
    Deleted,
}

impl EntryTag {
    pub fn is_visible(&self) -> bool {
        !matches!(self, EntryTag::Deleted)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    entry: LedgerEntry,
    tag: EntryTag,
    /// Insertion order, used to break `created_at` ties.
    seq: u64,
}

/// Why a local intent could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMiss {
    Unknown,
    Deleted,
}

#[derive(Debug, Default)]
pub struct LedgerCache {
    slots: HashMap<String, Slot>,
    /// Unseen remote records from a reload that ran during a create.
    held: HashMap<String, LedgerEntry>,
    next_seq: u64,
}

impl LedgerCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Add an optimistic entry for a create in flight.
    pub fn insert_pending(&mut self, entry: LedgerEntry) {
        let seq = self.next_seq();
        self.slots.insert(
            entry.id.clone(),
            Slot {
                entry,
                tag: EntryTag::Pending { before: None },
                seq,
            },
        );
    }

    /// Replace the sentinel slot by the confirmed entry, keeping its position.
    pub fn confirm_create(&mut self, sentinel: &str, entry: LedgerEntry) {
        let seq = match self.slots.remove(sentinel) {
            Some(slot) => slot.seq,
            None => self.next_seq(),
        };
        self.held.remove(&entry.id);
        let seq = self.slots.get(&entry.id).map(|s| s.seq.min(seq)).unwrap_or(seq);
        self.slots.insert(
            entry.id.clone(),
            Slot {
                entry,
                tag: EntryTag::Confirmed,
                seq,
            },
        );
        self.release_held();
    }

    /// Drop a slot outright (failed create, finished delete).
    pub fn remove(&mut self, id: &str) -> Option<LedgerEntry> {
        let removed = self.slots.remove(id).map(|slot| slot.entry);
        self.release_held();
        removed
    }

    fn has_pending_create(&self) -> bool {
        self.slots
            .values()
            .any(|slot| slot.tag == EntryTag::Pending { before: None })
    }

    /// Number of remote records waiting for in-flight creates to settle.
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    fn release_held(&mut self) {
        if self.held.is_empty() || self.has_pending_create() {
            return;
        }
        let mut held: Vec<LedgerEntry> = self.held.drain().map(|(_, entry)| entry).collect();
        held.sort_by(|a, b| a.id.cmp(&b.id));
        for entry in held {
            if self.slots.contains_key(&entry.id) {
                continue;
            }
            let seq = self.next_seq();
            self.slots.insert(
                entry.id.clone(),
                Slot {
                    entry,
                    tag: EntryTag::Confirmed,
                    seq,
                },
            );
        }
    }

    /// Apply `patch` optimistically. Returns the updated entry.
    pub fn begin_update(&mut self, id: &str, patch: &EntryPatch) -> Result<LedgerEntry, CacheMiss> {
        let slot = self.slots.get_mut(id).ok_or(CacheMiss::Unknown)?;
        if slot.tag == EntryTag::Deleted {
            return Err(CacheMiss::Deleted);
        }
        let before = slot.entry.clone();
        slot.entry = patch.apply_to(&before);
        slot.tag = EntryTag::Pending {
            before: Some(before),
        };
        Ok(slot.entry.clone())
    }

    /// Mark the pending intent on `id` as acknowledged.
    pub fn confirm(&mut self, id: &str) {
        if let Some(slot) = self.slots.get_mut(id) {
            if matches!(slot.tag, EntryTag::Pending { .. }) {
                slot.tag = EntryTag::Confirmed;
            }
        }
    }

    /// Restore the pre-mutation snapshot of a pending update.
    pub fn revert(&mut self, id: &str) -> Option<LedgerEntry> {
        let slot = self.slots.get_mut(id)?;
        match std::mem::replace(&mut slot.tag, EntryTag::Confirmed) {
            EntryTag::Pending {
                before: Some(before),
            } => {
                slot.entry = before;
                Some(slot.entry.clone())
            }
            other => {
                slot.tag = other;
                None
            }
        }
    }

    /// Hide `id` while its remote delete runs. Returns the hidden entry, or
    /// `None` when the id is unknown or already deleted.
    pub fn mark_deleted(&mut self, id: &str) -> Option<LedgerEntry> {
        let slot = self.slots.get_mut(id)?;
        if slot.tag == EntryTag::Deleted {
            return None;
        }
        slot.tag = EntryTag::Deleted;
        Some(slot.entry.clone())
    }

    /// Replace the confirmed contents with `remote`.
    ///
    /// Slots with a local intent in flight keep their local view; confirmed
    /// slots missing from `remote` disappear. Unseen ids wait while a create
    /// is pending.
    pub fn replace_all(&mut self, remote: Vec<LedgerEntry>) {
        let hold_new = self.has_pending_create();
        let mut previous = std::mem::take(&mut self.slots);
        let mut slots = HashMap::with_capacity(remote.len());
        self.held.clear();

        for entry in remote {
            let seq = match previous.get(&entry.id) {
                Some(slot) if slot.tag != EntryTag::Confirmed => continue,
                Some(slot) => slot.seq,
                None if hold_new => {
                    self.held.insert(entry.id.clone(), entry);
                    continue;
                }
                None => self.next_seq(),
            };
            slots.insert(
                entry.id.clone(),
                Slot {
                    entry,
                    tag: EntryTag::Confirmed,
                    seq,
                },
            );
        }

        for (id, slot) in previous.drain() {
            if slot.tag != EntryTag::Confirmed {
                slots.insert(id, slot);
            }
        }
        self.slots = slots;
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.held.clear();
    }

    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.slots
            .get(id)
            .filter(|slot| slot.tag.is_visible())
            .map(|slot| &slot.entry)
    }

    pub fn tag(&self, id: &str) -> Option<&EntryTag> {
        self.slots.get(id).map(|slot| &slot.tag)
    }

    /// Visible entries, newest first; equal timestamps keep insertion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut visible: Vec<&Slot> = self.slots.values().filter(|s| s.tag.is_visible()).collect();
        visible.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        visible.into_iter().map(|slot| slot.entry.clone()).collect()
    }

    /// Sum of all visible amounts.
    pub fn total(&self) -> Decimal {
        self.slots
            .values()
            .filter(|s| s.tag.is_visible())
            .map(|s| s.entry.amount)
            .sum()
    }

    /// Ids with a local intent in flight (pending or deleting).
    pub fn in_flight_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, s)| s.tag != EntryTag::Confirmed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.slots.values().filter(|s| s.tag.is_visible()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Category;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: &str, amount: i64, minutes: i64) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            amount: Decimal::from(amount),
            description: format!("entry {id}"),
            category: Category::Food,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    fn confirmed(entries: Vec<LedgerEntry>) -> LedgerCache {
        let mut cache = LedgerCache::new();
        cache.replace_all(entries);
        cache
    }

    fn ids(cache: &LedgerCache) -> Vec<String> {
        cache.entries().into_iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_total_and_optimistic_create() {
        let mut cache = confirmed(vec![entry("a", 50, 0), entry("b", 30, 1)]);
        assert_eq!(cache.total(), Decimal::from(80));

        cache.insert_pending(entry("local-1", 40, 2));
        assert_eq!(cache.total(), Decimal::from(120));
        assert_eq!(cache.tag("local-1"), Some(&EntryTag::Pending { before: None }));
    }

    #[test]
    fn test_order_newest_first_ties_by_insertion() {
        let cache = confirmed(vec![
            entry("old", 1, 0),
            entry("tie-first", 1, 5),
            entry("tie-second", 1, 5),
            entry("new", 1, 10),
        ]);
        assert_eq!(ids(&cache), vec!["new", "tie-first", "tie-second", "old"]);
    }

    #[test]
    fn test_confirm_create_keeps_position() {
        let mut cache = confirmed(vec![entry("a", 1, 5)]);
        cache.insert_pending(entry("local-1", 2, 5));

        let mut durable = entry("local-1", 2, 5);
        durable.id = "rec-9".to_string();
        cache.confirm_create("local-1", durable);

        assert_eq!(ids(&cache), vec!["a", "rec-9"]);
        assert_eq!(cache.tag("rec-9"), Some(&EntryTag::Confirmed));
        assert!(cache.tag("local-1").is_none());
    }

    #[test]
    fn test_update_then_revert_restores_snapshot() {
        let mut cache = confirmed(vec![entry("a", 50, 0)]);
        let before = cache.get("a").unwrap().clone();

        let updated = cache
            .begin_update("a", &EntryPatch::amount(Decimal::from(75)))
            .unwrap();
        assert_eq!(updated.amount, Decimal::from(75));
        assert_eq!(cache.total(), Decimal::from(75));

        assert_eq!(cache.revert("a"), Some(before.clone()));
        assert_eq!(cache.get("a"), Some(&before));
        assert_eq!(cache.tag("a"), Some(&EntryTag::Confirmed));
    }

    #[test]
    fn test_update_missing_or_deleted() {
        let mut cache = confirmed(vec![entry("a", 50, 0)]);
        let patch = EntryPatch::amount(Decimal::ONE);
        assert_eq!(cache.begin_update("zzz", &patch), Err(CacheMiss::Unknown));

        cache.mark_deleted("a").unwrap();
        assert_eq!(cache.begin_update("a", &patch), Err(CacheMiss::Deleted));
    }

    #[test]
    fn test_mark_deleted_hides_entry_once() {
        let mut cache = confirmed(vec![entry("a", 50, 0), entry("b", 30, 1)]);

        assert!(cache.mark_deleted("a").is_some());
        assert!(cache.mark_deleted("a").is_none());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.total(), Decimal::from(30));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_replace_all_preserves_in_flight_intents() {
        let mut cache = confirmed(vec![entry("a", 50, 0), entry("b", 30, 1), entry("c", 5, 2)]);
        cache.insert_pending(entry("local-1", 40, 3));
        cache.begin_update("a", &EntryPatch::amount(Decimal::from(55))).unwrap();
        cache.mark_deleted("b");

        // Remote still has the old values and no "c"
        cache.replace_all(vec![entry("a", 50, 0), entry("b", 30, 1), entry("d", 7, 4)]);

        assert_eq!(cache.get("a").unwrap().amount, Decimal::from(55));
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_none());
        assert!(cache.get("d").is_some());
        assert!(cache.get("local-1").is_some());
        assert_eq!(cache.total(), Decimal::from(55 + 7 + 40));
    }

    #[test]
    fn test_reload_during_create_never_duplicates() {
        let mut cache = confirmed(vec![entry("a", 50, 0)]);
        cache.insert_pending(entry("local-1", 40, 2));

        // The store already saved the create as "rec-9"; another client added "d".
        cache.replace_all(vec![entry("a", 50, 0), entry("rec-9", 40, 2), entry("d", 7, 3)]);
        assert!(cache.get("rec-9").is_none());
        assert!(cache.get("d").is_none());
        assert_eq!(cache.held_len(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total(), Decimal::from(90));

        cache.confirm_create("local-1", entry("rec-9", 40, 2));
        assert_eq!(cache.held_len(), 0);
        assert_eq!(ids(&cache), vec!["d", "rec-9", "a"]);
        assert_eq!(cache.total(), Decimal::from(97));
    }

    #[test]
    fn test_failed_create_releases_held_records() {
        let mut cache = confirmed(vec![]);
        cache.insert_pending(entry("local-1", 40, 2));
        cache.replace_all(vec![entry("d", 7, 3)]);
        assert_eq!(ids(&cache), vec!["local-1"]);

        cache.remove("local-1");
        assert_eq!(ids(&cache), vec!["d"]);
    }

    #[test]
    fn test_total_matches_sum_of_entries() {
        let mut cache = confirmed(vec![entry("a", 50, 0), entry("b", 30, 1)]);
        cache.insert_pending(entry("local-1", 40, 2));
        cache.mark_deleted("a");
        let summed: Decimal = cache.entries().iter().map(|e| e.amount).sum();
        assert_eq!(cache.total(), summed);
    }
}
