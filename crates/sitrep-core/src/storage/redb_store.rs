//! Redb-backed store for error records and the context log.
//!
//! Three tables in one database file:
//! - `errors`: fingerprint hex -> postcard [`ErrorRecord`]
//! - `context`: sequence number -> postcard [`ContextEntry`]
//! - `meta`: string key -> postcard scalar (currently `next_seq`)
//!
//! The context log is mirrored in memory behind a mutex: a mutation clones
//! the log, applies the change, commits the redb transaction, and only then
//! swaps the clone in. A crash mid-write leaves both the file and the
//! in-memory view on the previous committed state.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::context::{AppendOutcome, ContextEntry, ContextLog};
use crate::diagnostics::{ErrorRecord, SolutionRecord};
use crate::fingerprint::Fingerprint;
use crate::storage::StoreError;
use crate::{EntryKind, SolutionOutcome, Timestamp};

const ERRORS: TableDefinition<&str, &[u8]> = TableDefinition::new("errors");
const CONTEXT: TableDefinition<u64, &[u8]> = TableDefinition::new("context");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const NEXT_SEQ_KEY: &str = "next_seq";

// =============================================================================
// STORE
// =============================================================================

/// The durable diagnostics and context store.
pub struct Store {
    db: Database,
    context: Mutex<ContextLog>,
}

impl Store {
    /// Open (or create) the database at `path` and load the context log.
    ///
    /// `retention` bounds the context log; existing entries beyond the bound
    /// are kept until the next append evicts them.
    pub fn open(path: impl AsRef<Path>, retention: usize) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        // Ensure all tables exist so later reads never hit a missing table.
        let txn = db.begin_write()?;
        {
            txn.open_table(ERRORS)?;
            txn.open_table(CONTEXT)?;
            txn.open_table(META)?;
        }
        txn.commit()?;

        let context = load_context(&db, retention)?;
        Ok(Self {
            db,
            context: Mutex::new(context),
        })
    }

    fn context_lock(&self) -> std::sync::MutexGuard<'_, ContextLog> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Record a sighting of a raw build error.
    ///
    /// A new fingerprint creates a record with `occurrence_count = 1`; a
    /// repeat bumps the count and `last_seen` only.
    pub fn record_error(&self, raw_message: &str, now: Timestamp) -> Result<ErrorRecord, StoreError> {
        let fingerprint = Fingerprint::of(raw_message);
        let txn = self.db.begin_write()?;
        let record;
        {
            let mut table = txn.open_table(ERRORS)?;
            let existing = table
                .get(fingerprint.as_str())?
                .map(|guard| guard.value().to_vec());

            record = match existing {
                Some(bytes) => {
                    let mut rec = decode_error(fingerprint.as_str(), &bytes)?;
                    rec.record_repeat(now);
                    rec
                }
                None => ErrorRecord::new(fingerprint.clone(), raw_message, now),
            };

            let bytes = encode(fingerprint.as_str(), &record)?;
            table.insert(fingerprint.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(record)
    }

    /// Link a solution to an existing error record.
    ///
    /// Fails with [`StoreError::UnknownFingerprint`] when no record exists;
    /// nothing is written in that case.
    pub fn record_solution(
        &self,
        fingerprint: &Fingerprint,
        description: &str,
        outcome: SolutionOutcome,
        now: Timestamp,
    ) -> Result<SolutionRecord, StoreError> {
        let solution = SolutionRecord::new(description, now, outcome);
        self.update_error(fingerprint, |record| {
            record.push_solution(solution.clone());
        })?;
        Ok(solution)
    }

    /// Rewrite the outcome of a previously recorded solution, identified by
    /// its description and application time.
    pub fn resolve_solution(
        &self,
        fingerprint: &Fingerprint,
        description: &str,
        applied_at: Timestamp,
        outcome: SolutionOutcome,
    ) -> Result<(), StoreError> {
        self.update_error(fingerprint, |record| {
            for solution in &mut record.linked_solutions {
                if solution.description == description && solution.applied_at == applied_at {
                    solution.outcome = outcome;
                }
            }
            record.rank_solutions();
        })
    }

    /// Read-modify-write one error record in a single committed transaction.
    fn update_error(
        &self,
        fingerprint: &Fingerprint,
        mutate: impl FnOnce(&mut ErrorRecord),
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ERRORS)?;
            let bytes = table
                .get(fingerprint.as_str())?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StoreError::UnknownFingerprint(fingerprint.as_str().to_string()))?;

            let mut record = decode_error(fingerprint.as_str(), &bytes)?;
            mutate(&mut record);

            let bytes = encode(fingerprint.as_str(), &record)?;
            table.insert(fingerprint.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// The stored record for a fingerprint, if any.
    pub fn get_error(&self, fingerprint: &Fingerprint) -> Result<Option<ErrorRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ERRORS)?;
        let bytes = table
            .get(fingerprint.as_str())?
            .map(|guard| guard.value().to_vec());
        match bytes {
            Some(bytes) => Ok(Some(decode_error(fingerprint.as_str(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Ranked solutions for a fingerprint; empty when the fingerprint is
    /// unknown (an unknown error simply has no history yet).
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Vec<SolutionRecord>, StoreError> {
        Ok(self
            .get_error(fingerprint)?
            .map(|record| record.linked_solutions)
            .unwrap_or_default())
    }

    /// Up to `limit` records, most recent `last_seen` first.
    pub fn recent_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ERRORS)?;

        let mut records = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            records.push(decode_error(key.value(), value.value())?);
        }
        records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        records.truncate(limit);
        Ok(records)
    }

    /// Number of tracked error fingerprints.
    pub fn error_count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ERRORS)?;
        Ok(table.len()?)
    }

    // =========================================================================
    // CONTEXT
    // =========================================================================

    /// Append a context entry, durably.
    ///
    /// The log append, any eviction, and the sequence counter all land in
    /// one committed transaction; for a PhaseChange the phase pointer moves
    /// atomically with the append (it is derived from the log itself).
    pub fn append_context(
        &self,
        kind: EntryKind,
        payload: impl Into<String>,
        now: Timestamp,
    ) -> Result<AppendOutcome, StoreError> {
        let mut guard = self.context_lock();
        let mut next = guard.clone();
        let outcome = next.append(kind, payload, now);

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CONTEXT)?;
            let bytes = encode("context", &outcome.entry)?;
            table.insert(outcome.seq, bytes.as_slice())?;
            for seq in &outcome.evicted {
                table.remove(*seq)?;
            }

            let mut meta = txn.open_table(META)?;
            let bytes = encode(NEXT_SEQ_KEY, &next.next_seq())?;
            meta.insert(NEXT_SEQ_KEY, bytes.as_slice())?;
        }
        txn.commit()?;

        *guard = next;
        Ok(outcome)
    }

    /// Most recent context entries first, optionally filtered by kind.
    pub fn recent_context(&self, limit: usize, kind_filter: Option<EntryKind>) -> Vec<ContextEntry> {
        self.context_lock()
            .recent(limit, kind_filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The phase set by the most recent PhaseChange, if any.
    pub fn current_phase(&self) -> Option<String> {
        self.context_lock().current_phase().map(String::from)
    }

    /// Number of retained context entries.
    pub fn context_len(&self) -> usize {
        self.context_lock().len()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("context_len", &self.context_lock().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CODEC HELPERS
// =============================================================================

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(|e| StoreError::corrupt(key, e))
}

fn decode_error(key: &str, bytes: &[u8]) -> Result<ErrorRecord, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::corrupt(key, e))
}

fn decode_entry(seq: u64, bytes: &[u8]) -> Result<ContextEntry, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::corrupt(format!("context/{seq}"), e))
}

fn load_context(db: &Database, retention: usize) -> Result<ContextLog, StoreError> {
    let txn = db.begin_read()?;

    let table = txn.open_table(CONTEXT)?;
    let mut entries = Vec::new();
    for item in table.iter()? {
        let (key, value) = item?;
        let seq = key.value();
        entries.push((seq, decode_entry(seq, value.value())?));
    }

    let meta = txn.open_table(META)?;
    let next_seq = match meta.get(NEXT_SEQ_KEY)?.map(|guard| guard.value().to_vec()) {
        Some(bytes) => {
            postcard::from_bytes(&bytes).map_err(|e| StoreError::corrupt(NEXT_SEQ_KEY, e))?
        }
        None => 0,
    };

    Ok(ContextLog::from_parts(entries, next_seq, retention))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("sitrep.redb"), 50).unwrap()
    }

    #[test]
    fn record_error_creates_then_bumps() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let first = store.record_error("error: bad type", ts(100)).unwrap();
        assert_eq!(first.occurrence_count, 1);

        let second = store.record_error("ERROR: bad  type", ts(200)).unwrap();
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.first_seen, ts(100));
        assert_eq!(second.last_seen, ts(200));
    }

    #[test]
    fn solution_against_unknown_fingerprint_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let fp = Fingerprint::of("never recorded");
        let err = store
            .record_solution(&fp, "a fix", SolutionOutcome::Unverified, ts(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownFingerprint(_)));
        // No partial record was created.
        assert!(store.get_error(&fp).unwrap().is_none());
    }

    #[test]
    fn lookup_returns_ranked_solutions() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let rec = store.record_error("error: bad type", ts(1)).unwrap();
        store
            .record_solution(&rec.fingerprint, "failed fix", SolutionOutcome::Failed, ts(10))
            .unwrap();
        store
            .record_solution(&rec.fingerprint, "good fix", SolutionOutcome::Verified, ts(20))
            .unwrap();

        let solutions = store.lookup(&rec.fingerprint).unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions[0].description, "good fix");
        assert_eq!(solutions[1].description, "failed fix");
    }

    #[test]
    fn lookup_unknown_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let solutions = store.lookup(&Fingerprint::of("nothing")).unwrap();
        assert!(solutions.is_empty());
    }

    #[test]
    fn resolve_solution_rewrites_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let rec = store.record_error("error: bad type", ts(1)).unwrap();
        store
            .record_solution(&rec.fingerprint, "the fix", SolutionOutcome::Unverified, ts(10))
            .unwrap();
        store
            .resolve_solution(&rec.fingerprint, "the fix", ts(10), SolutionOutcome::Verified)
            .unwrap();

        let solutions = store.lookup(&rec.fingerprint).unwrap();
        assert_eq!(solutions[0].outcome, SolutionOutcome::Verified);
    }

    #[test]
    fn recent_errors_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.record_error("error: alpha", ts(10)).unwrap();
        store.record_error("error: beta", ts(30)).unwrap();
        store.record_error("error: gamma", ts(20)).unwrap();

        let recent = store.recent_errors(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].raw_message, "error: beta");
        assert_eq!(recent[1].raw_message, "error: gamma");
        assert_eq!(store.error_count().unwrap(), 3);
    }

    #[test]
    fn context_appends_and_phase_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            store
                .append_context(EntryKind::PhaseChange, "phase 1", ts(1))
                .unwrap();
            store.append_context(EntryKind::Note, "working on it", ts(2)).unwrap();
            store.record_error("error: bad type", ts(3)).unwrap();
        }

        let store = open_store(&dir);
        assert_eq!(store.current_phase().as_deref(), Some("phase 1"));
        assert_eq!(store.context_len(), 2);

        let recent = store.recent_context(10, None);
        assert_eq!(recent[0].payload, "working on it");
        assert_eq!(recent[0].phase_at_time.as_deref(), Some("phase 1"));

        let rec = store
            .get_error(&Fingerprint::of("error: bad type"))
            .unwrap()
            .unwrap();
        assert_eq!(rec.occurrence_count, 1);

        // Sequence numbering continues where it left off.
        let outcome = store.append_context(EntryKind::Note, "back again", ts(4)).unwrap();
        assert_eq!(outcome.seq, 2);
    }

    #[test]
    fn context_eviction_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path().join("sitrep.redb"), 3).unwrap();
            store
                .append_context(EntryKind::PhaseChange, "phase 1", ts(1))
                .unwrap();
            for i in 0..5u64 {
                store
                    .append_context(EntryKind::Note, format!("note {i}"), ts(10 + i))
                    .unwrap();
            }
        }

        let store = Store::open(dir.path().join("sitrep.redb"), 3).unwrap();
        assert_eq!(store.context_len(), 3);
        // The pinned phase survived the overflow and the restart.
        assert_eq!(store.current_phase().as_deref(), Some("phase 1"));
        let payloads: Vec<String> = store
            .recent_context(10, None)
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(payloads, vec!["note 4", "note 3", "phase 1"]);
    }

    #[test]
    fn corrupt_record_is_reported_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitrep.redb");
        let fp = Fingerprint::of("error: bad type");
        {
            let store = Store::open(&path, 50).unwrap();
            store.record_error("error: bad type", ts(1)).unwrap();
        }
        {
            // Overwrite the stored bytes with garbage out-of-band.
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(ERRORS).unwrap();
                table.insert(fp.as_str(), [0xff_u8].as_slice()).unwrap();
            }
            txn.commit().unwrap();
        }

        let store = Store::open(&path, 50).unwrap();
        let err = store.get_error(&fp).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
