//! Channel table records.
//!
//! A channel is the program-visible shared record: current field values,
//! per-field commit stamps, pending delayed updates keyed by field, the
//! cached minimum pending time, and the set of processes sensitized to the
//! channel. The cross-record parts of an update (waking triggers, event
//! queue bookkeeping) live in the scheduler state; this module owns the
//! record-local invariants.

use crate::types::{Key, LogicalTime, ProcessId, Record, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One channel table.
///
/// Invariants maintained here:
/// - every pending update is strictly in the future at insertion time;
/// - `earliest` is the minimum pending time, or `NEVER` when nothing is
///   pending;
/// - `queued` mirrors membership in the scheduler's event queue.
#[derive(Debug)]
pub(crate) struct ChannelRecord {
    /// Currently visible field values.
    pub values: Record,
    /// Per-field time of the most recent commit.
    pub stamps: BTreeMap<Key, LogicalTime>,
    /// Pending delayed updates, one per field.
    pub pending: BTreeMap<Key, (LogicalTime, Value)>,
    /// Minimum over pending times; `NEVER` when `pending` is empty.
    pub earliest: LogicalTime,
    /// Processes blocked on the next update to this channel. Ordered so
    /// wake scans are reproducible.
    pub triggers: BTreeSet<ProcessId>,
    /// True iff this channel is in the scheduler's event queue.
    pub queued: bool,
}

impl ChannelRecord {
    /// Creates a record from an initializer, stamping every field at `now`.
    pub fn new(init: Record, now: LogicalTime) -> Self {
        let stamps = init.keys().cloned().map(|k| (k, now)).collect();
        Self {
            values: init,
            stamps,
            pending: BTreeMap::new(),
            earliest: LogicalTime::NEVER,
            triggers: BTreeSet::new(),
            queued: false,
        }
    }

    /// Returns the visible value of a field.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the last commit time: for one field if `key` is given,
    /// otherwise the maximum over all fields.
    pub fn last_updated(&self, key: Option<&Key>) -> Option<LogicalTime> {
        match key {
            Some(k) => self.stamps.get(k).copied(),
            None => self.stamps.values().max().copied(),
        }
    }

    /// Writes a field in the current instant.
    pub fn write_now(&mut self, key: Key, value: Value, now: LogicalTime) {
        self.stamps.insert(key.clone(), now);
        self.values.insert(key, value);
    }

    /// Deletes a field in the current instant, clearing its stamp.
    pub fn delete_now(&mut self, key: &Key) {
        self.values.remove(key);
        self.stamps.remove(key);
    }

    /// Stores a delayed update for `key` at time `at`, replacing any update
    /// already pending on that field.
    ///
    /// Returns true if the cached `earliest` changed. The caller must have
    /// checked `at` is strictly in the future.
    pub fn store_pending(&mut self, key: Key, at: LogicalTime, value: Value) -> bool {
        let before = self.earliest;
        let previous = self.pending.insert(key, (at, value));
        match previous {
            // The displaced update was the (sole) holder of the minimum and
            // sat earlier than the replacement: rescan.
            Some((was, _)) if was == self.earliest && was < at => {
                self.earliest = Self::min_pending(&self.pending);
            }
            _ => {
                self.earliest = self.earliest.min(at);
            }
        }
        self.earliest != before
    }

    /// Applies every pending update scheduled for `now` and recomputes
    /// `earliest`. Returns the woken process set; the caller enqueues them.
    ///
    /// Must only be called when `earliest == now`.
    pub fn commit(&mut self, now: LogicalTime) -> Vec<ProcessId> {
        assert_eq!(
            self.earliest, now,
            "commit must happen at the channel's earliest pending time"
        );
        let due: Vec<Key> = self
            .pending
            .iter()
            .filter(|(_, (at, _))| *at == now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in due {
            let (at, value) = self.pending.remove(&key).expect("due key is pending");
            self.values.insert(key.clone(), value);
            self.stamps.insert(key, at);
        }
        debug_assert!(
            self.pending.values().all(|(at, _)| *at > now),
            "no pending update may sit in the past"
        );
        self.earliest = Self::min_pending(&self.pending);

        let woken: Vec<ProcessId> = self.triggers.iter().copied().collect();
        self.triggers.clear();
        woken
    }

    fn min_pending(pending: &BTreeMap<Key, (LogicalTime, Value)>) -> LogicalTime {
        pending
            .values()
            .map(|(at, _)| *at)
            .min()
            .unwrap_or(LogicalTime::NEVER)
    }
}
