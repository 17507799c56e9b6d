//! # Aggregation Engine
//!
//! The facade composing the scorer, the diagnostics store, and the context
//! store into the two operations the outside world calls: `status` and
//! `apply_fix`.
//!
//! The engine degrades before it fails: missing collectors and an unreadable
//! error history become `degraded` notes on the report, and `status` errors
//! only when every signal is Unavailable *and* the store cannot be read.

use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::report::{next_steps, ErrorSummary, StatusReport};
use crate::score::{compute, WeightTable};
use crate::signal::ComponentSignal;
use crate::storage::{Store, StoreError};
use crate::{SolutionOutcome, Timestamp};

// =============================================================================
// BUILD VERIFICATION
// =============================================================================

/// Outcome of one build-verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVerdict {
    /// The build completed successfully.
    Passed,
    /// The build ran and failed.
    Failed,
    /// The build could not be run at all.
    Unavailable,
}

/// Runs a build to verify an applied fix.
///
/// Implementations live in the app layer (a configured shell command with a
/// bounded wait); the engine only consumes the verdict. Inability to run a
/// build is `Unavailable`, never `Failed`.
pub trait BuildTrigger {
    fn run_build(&self) -> BuildVerdict;
}

/// How a recorded fix was verified, for reporting back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// No trigger was supplied.
    NotRequested,
    /// A verification build passed.
    Passed,
    /// A verification build failed.
    Failed,
    /// A trigger was supplied but no build could be run.
    Inconclusive,
}

/// Result of [`Engine::apply_fix`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FixReport {
    /// Fingerprint the error resolved to.
    pub fingerprint: Fingerprint,

    /// Total sightings of this error, including this one.
    pub occurrence_count: u64,

    /// Final recorded outcome of the solution.
    pub outcome: SolutionOutcome,

    /// What verification concluded.
    pub verification: VerificationStatus,
}

// =============================================================================
// ENGINE ERRORS
// =============================================================================

/// Errors surfaced by the engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A solution referenced a fingerprint with no recorded error.
    #[error("unknown fingerprint '{0}'")]
    UnknownFingerprint(String),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// Nothing to report: every signal is Unavailable and the error history
    /// cannot be read.
    #[error("no data: all collectors unavailable and the store is unreadable")]
    NoData,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownFingerprint(fp) => Self::UnknownFingerprint(fp),
            other => Self::Store(other),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The aggregation facade.
pub struct Engine {
    store: Store,
    weights: WeightTable,
    recent_error_limit: usize,
}

impl Engine {
    /// Wire the engine to its store and weight table.
    #[must_use]
    pub fn new(store: Store, weights: WeightTable, recent_error_limit: usize) -> Self {
        Self {
            store,
            weights,
            recent_error_limit,
        }
    }

    /// Direct access to the underlying store, for context operations and
    /// raw history queries.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The registered weight table.
    #[must_use]
    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Produce the aggregated status picture from freshly collected signals.
    ///
    /// Degrades rather than fails: Unavailable signals and an unreadable
    /// error history become `degraded` notes. Fails with [`EngineError::NoData`]
    /// only when every signal is Unavailable and the store read also failed.
    pub fn status(
        &self,
        signals: &[ComponentSignal],
        now: Timestamp,
    ) -> Result<StatusReport, EngineError> {
        let readiness = compute(signals, &self.weights, now);

        let mut degraded: Vec<String> = signals
            .iter()
            .filter(|s| !s.is_available())
            .map(|s| format!("component '{}' unavailable: {}", s.name, s.detail))
            .collect();

        let all_unavailable = !signals.is_empty() && signals.iter().all(|s| !s.is_available());

        let recent_errors = match self.store.recent_errors(self.recent_error_limit) {
            Ok(records) => records.iter().map(ErrorSummary::from_record).collect(),
            Err(err) => {
                if all_unavailable {
                    return Err(EngineError::NoData);
                }
                degraded.push(format!("error history unavailable: {err}"));
                Vec::new()
            }
        };

        if readiness.no_data {
            degraded.push("no weighted component produced data".to_string());
        }

        let steps = next_steps(&readiness);
        Ok(StatusReport {
            readiness,
            current_phase: self.store.current_phase(),
            recent_errors,
            next_steps: steps,
            degraded,
        })
    }

    /// Record a fix for a build error, optionally verifying it with a build.
    ///
    /// The error is (re-)fingerprinted and recorded first, then the solution
    /// lands as Unverified. With a trigger, a passing build promotes it to
    /// Verified and a failing build demotes it to Failed; an unrunnable
    /// build leaves it Unverified; inability to verify is not a failed fix.
    pub fn apply_fix(
        &self,
        raw_error: &str,
        solution: &str,
        trigger: Option<&dyn BuildTrigger>,
        now: Timestamp,
    ) -> Result<FixReport, EngineError> {
        let record = self.store.record_error(raw_error, now)?;
        let recorded = self
            .store
            .record_solution(&record.fingerprint, solution, SolutionOutcome::Unverified, now)?;

        let (outcome, verification) = match trigger.map(BuildTrigger::run_build) {
            None => (SolutionOutcome::Unverified, VerificationStatus::NotRequested),
            Some(BuildVerdict::Passed) => (SolutionOutcome::Verified, VerificationStatus::Passed),
            Some(BuildVerdict::Failed) => (SolutionOutcome::Failed, VerificationStatus::Failed),
            Some(BuildVerdict::Unavailable) => {
                (SolutionOutcome::Unverified, VerificationStatus::Inconclusive)
            }
        };

        if outcome != SolutionOutcome::Unverified {
            self.store
                .resolve_solution(&record.fingerprint, solution, recorded.applied_at, outcome)?;
        }

        Ok(FixReport {
            fingerprint: record.fingerprint,
            occurrence_count: record.occurrence_count,
            outcome,
            verification,
        })
    }

    /// Ranked solution history for a raw error message.
    pub fn lookup_solutions(
        &self,
        raw_error: &str,
    ) -> Result<(Fingerprint, Vec<crate::SolutionRecord>), EngineError> {
        let fingerprint = Fingerprint::of(raw_error);
        let solutions = self.store.lookup(&fingerprint)?;
        Ok((fingerprint, solutions))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::EntryKind;

    struct FixedTrigger(BuildVerdict);

    impl BuildTrigger for FixedTrigger {
        fn run_build(&self) -> BuildVerdict {
            self.0
        }
    }

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn engine(dir: &tempfile::TempDir) -> Engine {
        let store = Store::open(dir.path().join("sitrep.redb"), 50).unwrap();
        let weights = WeightTable::new()
            .with("version_control", 1.0)
            .with("build", 2.0);
        Engine::new(store, weights, 5)
    }

    #[test]
    fn status_merges_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);
        eng.store()
            .append_context(EntryKind::PhaseChange, "phase 2", ts(1))
            .unwrap();
        eng.store().record_error("error: bad type", ts(2)).unwrap();

        let signals = vec![
            ComponentSignal::complete("version_control", None, "clean"),
            ComponentSignal::missing("build", "failing"),
        ];
        let report = eng.status(&signals, ts(10)).unwrap();

        assert_eq!(report.current_phase.as_deref(), Some("phase 2"));
        assert_eq!(report.recent_errors.len(), 1);
        assert!(report.next_steps[0].contains("build"));
        assert!(report.degraded.is_empty());
    }

    #[test]
    fn unavailable_signals_degrade_but_still_report() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let signals = vec![
            ComponentSignal::complete("version_control", None, "clean"),
            ComponentSignal::unavailable("build", "no log found"),
        ];
        let report = eng.status(&signals, ts(10)).unwrap();

        assert_eq!(report.readiness.overall_percentage, 100.0);
        assert_eq!(report.degraded.len(), 1);
        assert!(report.degraded[0].contains("no log found"));
    }

    #[test]
    fn all_unavailable_is_degraded_when_store_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let signals = vec![ComponentSignal::unavailable("build", "no log")];
        let report = eng.status(&signals, ts(10)).unwrap();
        assert!(report.readiness.no_data);
        assert!(report.degraded.iter().any(|d| d.contains("no weighted component")));
    }

    #[test]
    fn fix_without_trigger_stays_unverified() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let report = eng.apply_fix("error: bad type", "changed the type", None, ts(1)).unwrap();
        assert_eq!(report.outcome, SolutionOutcome::Unverified);
        assert_eq!(report.verification, VerificationStatus::NotRequested);
        assert_eq!(report.occurrence_count, 1);

        let (_, solutions) = eng.lookup_solutions("error: bad type").unwrap();
        assert_eq!(solutions[0].outcome, SolutionOutcome::Unverified);
    }

    #[test]
    fn passing_build_promotes_to_verified() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let report = eng
            .apply_fix(
                "error: bad type",
                "changed the type",
                Some(&FixedTrigger(BuildVerdict::Passed)),
                ts(1),
            )
            .unwrap();
        assert_eq!(report.outcome, SolutionOutcome::Verified);
        assert_eq!(report.verification, VerificationStatus::Passed);

        let (_, solutions) = eng.lookup_solutions("error: bad type").unwrap();
        assert_eq!(solutions[0].outcome, SolutionOutcome::Verified);
    }

    #[test]
    fn failing_build_demotes_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let report = eng
            .apply_fix(
                "error: bad type",
                "made it worse",
                Some(&FixedTrigger(BuildVerdict::Failed)),
                ts(1),
            )
            .unwrap();
        assert_eq!(report.outcome, SolutionOutcome::Failed);
        assert_eq!(report.verification, VerificationStatus::Failed);
    }

    #[test]
    fn unrunnable_build_is_inconclusive_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        let report = eng
            .apply_fix(
                "error: bad type",
                "a fix",
                Some(&FixedTrigger(BuildVerdict::Unavailable)),
                ts(1),
            )
            .unwrap();
        assert_eq!(report.outcome, SolutionOutcome::Unverified);
        assert_eq!(report.verification, VerificationStatus::Inconclusive);
    }

    #[test]
    fn repeated_fix_bumps_occurrence_count() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);

        eng.apply_fix("error at /a/b.rs:1: bad type", "fix one", None, ts(1)).unwrap();
        let report = eng
            .apply_fix("error at /x/y.rs:9: bad type", "fix two", None, ts(2))
            .unwrap();
        assert_eq!(report.occurrence_count, 2);

        let (_, solutions) = eng.lookup_solutions("error at /z/z.rs:3: bad type").unwrap();
        assert_eq!(solutions.len(), 2);
    }

    #[test]
    fn lookup_unknown_error_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let eng = engine(&dir);
        let (_, solutions) = eng.lookup_solutions("never seen").unwrap();
        assert!(solutions.is_empty());
    }
}
