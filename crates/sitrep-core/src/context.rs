//! # Context Log
//!
//! Bounded, time-ordered log of phase transitions and development notes.
//!
//! The "current phase" pointer is owned here and mutated only through
//! [`ContextLog::append`]; there is no ambient global. Retention is strictly
//! FIFO by age with one exception: the most recent PhaseChange entry is
//! pinned so the current phase is always reconstructable from the log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{EntryKind, Timestamp};

/// Default retention bound for the context log.
pub const DEFAULT_RETENTION: usize = 200;

// =============================================================================
// CONTEXT ENTRY
// =============================================================================

/// One appended entry. Append-only: entries are evicted, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Entry kind.
    pub kind: EntryKind,

    /// Note text, or the new phase name for a PhaseChange.
    pub payload: String,

    /// The phase in effect once this entry is applied.
    pub phase_at_time: Option<String>,

    /// Append time; monotonic within the log.
    pub timestamp: Timestamp,
}

/// Result of an append: the assigned sequence number, the stored entry,
/// and the sequence numbers evicted to stay within the bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub seq: u64,
    pub entry: ContextEntry,
    pub evicted: Vec<u64>,
}

// =============================================================================
// CONTEXT LOG
// =============================================================================

/// The bounded in-memory context log.
///
/// Entries are kept in ascending sequence order. The storage layer mirrors
/// every mutation durably; this type owns the invariants.
#[derive(Debug, Clone)]
pub struct ContextLog {
    /// (sequence, entry), ascending by sequence.
    entries: VecDeque<(u64, ContextEntry)>,

    /// Next sequence number to assign.
    next_seq: u64,

    /// Retention bound (at least 1).
    bound: usize,

    /// Sequence of the most recent PhaseChange entry; pinned from eviction.
    phase_seq: Option<u64>,

    /// Current phase, derived from the most recent PhaseChange.
    current_phase: Option<String>,
}

impl ContextLog {
    /// Create an empty log with the given retention bound.
    #[must_use]
    pub fn new(bound: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
            bound: bound.max(1),
            phase_seq: None,
            current_phase: None,
        }
    }

    /// Rebuild from persisted state. `entries` must be ascending by
    /// sequence (storage iterates keys in order); the phase pointer is
    /// reconstructed from the log itself.
    #[must_use]
    pub fn from_parts(entries: Vec<(u64, ContextEntry)>, next_seq: u64, bound: usize) -> Self {
        let mut phase_seq = None;
        let mut current_phase = None;
        for (seq, entry) in entries.iter().rev() {
            if entry.kind == EntryKind::PhaseChange {
                phase_seq = Some(*seq);
                current_phase = Some(entry.payload.clone());
                break;
            }
        }
        let highest = entries.last().map(|(seq, _)| seq.saturating_add(1)).unwrap_or(0);
        Self {
            entries: entries.into(),
            next_seq: next_seq.max(highest),
            bound: bound.max(1),
            phase_seq,
            current_phase,
        }
    }

    /// Append an entry, updating the phase pointer atomically with the log
    /// for PhaseChange entries and evicting past the retention bound.
    ///
    /// Non-monotonic caller timestamps are clamped up to the previous
    /// entry's timestamp so ordering stays monotonic.
    pub fn append(&mut self, kind: EntryKind, payload: impl Into<String>, now: Timestamp) -> AppendOutcome {
        let payload = payload.into();
        let timestamp = self
            .entries
            .back()
            .map(|(_, e)| e.timestamp.max(now))
            .unwrap_or(now);

        let phase_at_time = match kind {
            EntryKind::PhaseChange => Some(payload.clone()),
            EntryKind::Note => self.current_phase.clone(),
        };

        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);

        let entry = ContextEntry {
            kind,
            payload,
            phase_at_time,
            timestamp,
        };
        self.entries.push_back((seq, entry.clone()));

        if kind == EntryKind::PhaseChange {
            self.phase_seq = Some(seq);
            self.current_phase = Some(entry.payload.clone());
        }

        let evicted = self.evict_past_bound();
        AppendOutcome { seq, entry, evicted }
    }

    /// Evict oldest-first until within the bound, skipping the pinned
    /// PhaseChange entry.
    fn evict_past_bound(&mut self) -> Vec<u64> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.bound {
            let candidate = self
                .entries
                .iter()
                .position(|(seq, _)| Some(*seq) != self.phase_seq);
            match candidate {
                Some(idx) => {
                    if let Some((seq, _)) = self.entries.remove(idx) {
                        evicted.push(seq);
                    }
                }
                // Only the pinned entry remains; nothing further to evict.
                None => break,
            }
        }
        evicted
    }

    /// Most recent entries first, optionally filtered by kind.
    #[must_use]
    pub fn recent(&self, limit: usize, kind_filter: Option<EntryKind>) -> Vec<&ContextEntry> {
        self.entries
            .iter()
            .rev()
            .map(|(_, entry)| entry)
            .filter(|entry| kind_filter.is_none_or(|k| entry.kind == k))
            .take(limit)
            .collect()
    }

    /// The phase set by the most recent PhaseChange, if any.
    #[must_use]
    pub fn current_phase(&self) -> Option<&str> {
        self.current_phase.as_deref()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The retention bound.
    #[must_use]
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// The next sequence number to be assigned.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Retained (sequence, entry) pairs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &ContextEntry)> {
        self.entries.iter().map(|(seq, entry)| (*seq, entry))
    }
}

impl Default for ContextLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn append_and_recent_order() {
        let mut log = ContextLog::new(10);
        log.append(EntryKind::Note, "first", ts(1));
        log.append(EntryKind::Note, "second", ts(2));
        log.append(EntryKind::Note, "third", ts(3));

        let recent: Vec<&str> = log.recent(2, None).iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(recent, vec!["third", "second"]);
    }

    #[test]
    fn phase_pointer_tracks_latest_phase_change() {
        let mut log = ContextLog::new(10);
        assert_eq!(log.current_phase(), None);

        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        assert_eq!(log.current_phase(), Some("phase 1"));

        log.append(EntryKind::Note, "working", ts(2));
        assert_eq!(log.current_phase(), Some("phase 1"));

        log.append(EntryKind::PhaseChange, "phase 2", ts(3));
        assert_eq!(log.current_phase(), Some("phase 2"));
    }

    #[test]
    fn notes_carry_phase_at_time() {
        let mut log = ContextLog::new(10);
        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        let outcome = log.append(EntryKind::Note, "observation", ts(2));
        assert_eq!(outcome.entry.phase_at_time.as_deref(), Some("phase 1"));
    }

    #[test]
    fn retention_evicts_oldest_first() {
        let mut log = ContextLog::new(3);
        log.append(EntryKind::Note, "a", ts(1));
        log.append(EntryKind::Note, "b", ts(2));
        log.append(EntryKind::Note, "c", ts(3));
        let outcome = log.append(EntryKind::Note, "d", ts(4));

        assert_eq!(outcome.evicted, vec![0]);
        let payloads: Vec<&str> = log.recent(10, None).iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["d", "c", "b"]);
    }

    #[test]
    fn last_phase_change_is_pinned() {
        let mut log = ContextLog::new(3);
        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        log.append(EntryKind::Note, "a", ts(2));
        log.append(EntryKind::Note, "b", ts(3));
        // Overflow: the PhaseChange is oldest but pinned; "a" goes instead.
        log.append(EntryKind::Note, "c", ts(4));

        assert_eq!(log.current_phase(), Some("phase 1"));
        let payloads: Vec<&str> = log.recent(10, None).iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["c", "b", "phase 1"]);
    }

    #[test]
    fn newer_phase_change_unpins_older_one() {
        let mut log = ContextLog::new(2);
        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        log.append(EntryKind::PhaseChange, "phase 2", ts(2));
        log.append(EntryKind::Note, "n", ts(3));

        assert_eq!(log.current_phase(), Some("phase 2"));
        let payloads: Vec<&str> = log.recent(10, None).iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["n", "phase 2"]);
    }

    #[test]
    fn kind_filter() {
        let mut log = ContextLog::new(10);
        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        log.append(EntryKind::Note, "a", ts(2));
        log.append(EntryKind::Note, "b", ts(3));

        let notes = log.recent(10, Some(EntryKind::Note));
        assert_eq!(notes.len(), 2);
        let phases = log.recent(10, Some(EntryKind::PhaseChange));
        assert_eq!(phases.len(), 1);
    }

    #[test]
    fn timestamps_are_clamped_monotonic() {
        let mut log = ContextLog::new(10);
        log.append(EntryKind::Note, "a", ts(100));
        let outcome = log.append(EntryKind::Note, "b", ts(50));
        assert_eq!(outcome.entry.timestamp, ts(100));
    }

    #[test]
    fn from_parts_reconstructs_phase_pointer() {
        let mut log = ContextLog::new(10);
        log.append(EntryKind::PhaseChange, "phase 1", ts(1));
        log.append(EntryKind::Note, "a", ts(2));
        log.append(EntryKind::PhaseChange, "phase 2", ts(3));
        log.append(EntryKind::Note, "b", ts(4));

        let parts: Vec<(u64, ContextEntry)> =
            log.iter().map(|(seq, e)| (seq, e.clone())).collect();
        let rebuilt = ContextLog::from_parts(parts, log.next_seq(), 10);

        assert_eq!(rebuilt.current_phase(), Some("phase 2"));
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(rebuilt.next_seq(), log.next_seq());
    }

    proptest! {
        /// The log never exceeds its bound (plus the single pinned entry)
        /// and never loses the most recent PhaseChange.
        #[test]
        fn retention_invariants(
            ops in proptest::collection::vec((any::<bool>(), 0u64..1000), 0..50),
            bound in 1usize..8,
        ) {
            let mut log = ContextLog::new(bound);
            let mut last_phase: Option<String> = None;
            for (i, (is_phase, t)) in ops.iter().enumerate() {
                if *is_phase {
                    let name = format!("phase-{i}");
                    last_phase = Some(name.clone());
                    log.append(EntryKind::PhaseChange, name, ts(*t));
                } else {
                    log.append(EntryKind::Note, format!("note-{i}"), ts(*t));
                }
            }
            prop_assert!(log.len() <= bound);
            prop_assert_eq!(log.current_phase().map(String::from), last_phase.clone());
            if let Some(phase) = last_phase {
                // Reconstructable from retained entries alone.
                let found = log
                    .recent(usize::MAX, Some(EntryKind::PhaseChange))
                    .first()
                    .map(|e| e.payload.clone());
                prop_assert_eq!(found, Some(phase));
            }
            // Timestamps are monotone across retained entries.
            let times: Vec<Timestamp> = log.iter().map(|(_, e)| e.timestamp).collect();
            prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
