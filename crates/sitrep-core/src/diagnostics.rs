//! # Diagnostics Records
//!
//! Error/solution records accumulated by the diagnostics store.
//!
//! Records are plain tagged data: an [`ErrorRecord`] per fingerprint, each
//! owning an ordered list of [`SolutionRecord`]s. Records are never deleted,
//! only accumulated; Failed solutions stay visible so repeated mistakes can
//! be seen, but they are never recommended first.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::{SolutionOutcome, Timestamp};

// =============================================================================
// SOLUTION RECORD
// =============================================================================

/// A fix attempt linked to one error fingerprint.
///
/// Owned exclusively by its parent [`ErrorRecord`]; never shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionRecord {
    /// What was done.
    pub description: String,

    /// When the fix was recorded.
    pub applied_at: Timestamp,

    /// Verification outcome.
    pub outcome: SolutionOutcome,
}

impl SolutionRecord {
    /// Create a new solution record.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        applied_at: Timestamp,
        outcome: SolutionOutcome,
    ) -> Self {
        Self {
            description: description.into(),
            applied_at,
            outcome,
        }
    }
}

// =============================================================================
// ERROR RECORD
// =============================================================================

/// The accumulated history for one error fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stable, path/line-insensitive key.
    pub fingerprint: Fingerprint,

    /// The message as first sighted (kept verbatim for humans).
    pub raw_message: String,

    /// First sighting; immutable once set.
    pub first_seen: Timestamp,

    /// Most recent sighting.
    pub last_seen: Timestamp,

    /// Total sightings; always >= 1.
    pub occurrence_count: u64,

    /// Linked solutions, ranked (see [`ErrorRecord::rank_solutions`]).
    pub linked_solutions: Vec<SolutionRecord>,
}

impl ErrorRecord {
    /// Create a record for a first sighting.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, raw_message: impl Into<String>, now: Timestamp) -> Self {
        Self {
            fingerprint,
            raw_message: raw_message.into(),
            first_seen: now,
            last_seen: now,
            occurrence_count: 1,
            linked_solutions: Vec::new(),
        }
    }

    /// Register a repeat sighting: bumps the count and `last_seen` only;
    /// `first_seen` never moves.
    pub fn record_repeat(&mut self, now: Timestamp) {
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        self.last_seen = self.last_seen.max(now);
    }

    /// Attach a solution and re-rank.
    pub fn push_solution(&mut self, solution: SolutionRecord) {
        self.linked_solutions.push(solution);
        self.rank_solutions();
    }

    /// Rank solutions for recommendation: Verified first (most recent
    /// Verified leading), then Unverified, then Failed last.
    pub fn rank_solutions(&mut self) {
        self.linked_solutions.sort_by(|a, b| {
            a.outcome
                .rank()
                .cmp(&b.outcome.rank())
                .then(b.applied_at.cmp(&a.applied_at))
        });
    }

    /// The top-ranked solution, if any.
    #[must_use]
    pub fn best_solution(&self) -> Option<&SolutionRecord> {
        self.linked_solutions.first()
    }

    /// Whether any linked solution has been verified by a build.
    #[must_use]
    pub fn has_verified_solution(&self) -> bool {
        self.linked_solutions
            .iter()
            .any(|s| s.outcome == SolutionOutcome::Verified)
    }
}

// =============================================================================
// TESTS
// =============================================================================
