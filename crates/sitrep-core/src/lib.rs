//! # Sitrep Core
//!
//! The deterministic readiness and diagnostics engine.
//!
//! This crate aggregates heterogeneous project signals (version control,
//! filesystem inventory, build output) into a weighted readiness picture,
//! fingerprints build errors against a growing solution history, and keeps a
//! bounded, time-ordered log of phase transitions and development notes.
//!
//! ## Architectural constraints
//!
//! - Pure and synchronous: no async, no network. Collectors and transport
//!   live in the app layer and talk to this crate through plain data.
//! - Deterministic: ordered keyed storage, explicit [`Timestamp`] arguments
//!   instead of ambient clocks, so every operation is replayable in tests.
//! - Durable: every store mutation commits a redb transaction before the
//!   call returns.

pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod fingerprint;
pub mod report;
pub mod score;
pub mod signal;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use context::{ContextEntry, ContextLog};
pub use diagnostics::{ErrorRecord, SolutionRecord};
pub use engine::{BuildTrigger, BuildVerdict, Engine, EngineError, FixReport, VerificationStatus};
pub use fingerprint::Fingerprint;
pub use report::{ErrorSummary, StatusReport};
pub use score::{ComponentScore, ReadinessReport, WeightTable};
pub use signal::{BuildSnapshot, ComponentSignal, VcsState};
pub use storage::{Store, StoreError};

// =============================================================================
// TIMESTAMP
// =============================================================================

/// Milliseconds since the Unix epoch.
///
/// Core logic never reads the wall clock itself; callers pass timestamps in
/// explicitly so the engine stays deterministic under test. [`Timestamp::now`]
/// is provided for the app layer's convenience.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Construct from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Current wall-clock time. A clock before the epoch reads as zero.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// =============================================================================
// STATUS ENUMERATIONS
// =============================================================================

/// Observed state of one tracked component.
///
/// A closed enumeration: unknown component *names* degrade through the
/// weight table instead of through free-text status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Component is fully present.
    Complete,
    /// Component exists but is incomplete.
    InProgress,
    /// Component is expected but absent.
    Missing,
    /// The probe for this component did not produce data.
    Unavailable,
}

impl ComponentStatus {
    /// Whether this status carries real data (everything except Unavailable).
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Overall health band derived from the readiness percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Excellent,
    Warning,
    Critical,
}

/// Outcome attached to a recorded solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionOutcome {
    /// A build passed after the fix was applied.
    Verified,
    /// Recorded but never confirmed by a build.
    Unverified,
    /// A build failed after the fix was applied.
    Failed,
}

impl SolutionOutcome {
    /// Ranking position for solution ordering: Verified first, Failed last.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Verified => 0,
            Self::Unverified => 1,
            Self::Failed => 2,
        }
    }
}

/// Kind of a context log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A development-phase transition; updates the current-phase pointer.
    PhaseChange,
    /// A free-text development note.
    Note,
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phase_change" | "phase" => Ok(Self::PhaseChange),
            "note" => Ok(Self::Note),
            other => Err(format!(
                "unknown entry kind '{other}' (expected 'phase_change' or 'note')"
            )),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
