//! # Signal Model
//!
//! Plain-data observations produced by the collectors in the app layer.
//!
//! Each collector returns either a populated [`ComponentSignal`] or an
//! explicit Unavailable marker; collectors never raise into the engine.
//! Signals are produced fresh on every collection pass and never persisted.

use serde::{Deserialize, Serialize};

use crate::ComponentStatus;

// =============================================================================
// COMPONENT SIGNAL
// =============================================================================

/// One named sub-system's observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSignal {
    /// Component name; must appear in the weight table to influence the score.
    pub name: String,

    /// Observed status.
    pub status: ComponentStatus,

    /// Observed metric (e.g. matching file count), when the probe has one.
    pub metric: Option<u64>,

    /// The probe's expected metric target, enabling a linear progress
    /// estimate for InProgress components. Absent means "estimate unknown".
    pub expected: Option<u64>,

    /// Free-text detail for humans.
    pub detail: String,
}

impl ComponentSignal {
    /// A fully present component.
    #[must_use]
    pub fn complete(name: impl Into<String>, metric: Option<u64>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::Complete,
            metric,
            expected: None,
            detail: detail.into(),
        }
    }

    /// A partially present component.
    #[must_use]
    pub fn in_progress(
        name: impl Into<String>,
        metric: Option<u64>,
        expected: Option<u64>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::InProgress,
            metric,
            expected,
            detail: detail.into(),
        }
    }

    /// An expected but absent component.
    #[must_use]
    pub fn missing(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::Missing,
            metric: None,
            expected: None,
            detail: detail.into(),
        }
    }

    /// A probe that produced no data. Excluded from scoring entirely.
    #[must_use]
    pub fn unavailable(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::Unavailable,
            metric: None,
            expected: None,
            detail: detail.into(),
        }
    }

    /// Whether this signal carries real data.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }
}

/// Classify a filesystem inventory count against its expected target.
///
/// Zero files is Missing; meeting or exceeding the target is Complete;
/// anything in between is InProgress with a linear estimate available.
#[must_use]
pub fn classify_inventory(
    name: impl Into<String>,
    found: u64,
    expected: u64,
    detail: impl Into<String>,
) -> ComponentSignal {
    if found == 0 {
        ComponentSignal::missing(name, detail)
    } else if found >= expected {
        ComponentSignal::complete(name, Some(found), detail)
    } else {
        ComponentSignal::in_progress(name, Some(found), Some(expected), detail)
    }
}

// =============================================================================
// BOUNDARY CONTRACTS
// =============================================================================

/// Version-control collector output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsState {
    pub branch: String,
    pub clean: bool,
    pub untracked_count: u64,
    pub last_commit_summary: String,
}

impl VcsState {
    /// Convert into a component signal: a clean tree is Complete, a dirty
    /// tree is InProgress (uncommitted work pending).
    #[must_use]
    pub fn to_signal(&self, name: impl Into<String>) -> ComponentSignal {
        let detail = format!(
            "branch '{}' ({}): {}",
            self.branch,
            if self.clean { "clean" } else { "dirty" },
            self.last_commit_summary
        );
        if self.clean {
            ComponentSignal::complete(name, Some(0), detail)
        } else {
            ComponentSignal::in_progress(name, Some(self.untracked_count), None, detail)
        }
    }
}

/// Build-output collector result: raw diagnostic lines from the most
/// recent build attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl BuildSnapshot {
    /// Convert into a component signal. Errors mean the build is failing
    /// (Missing, 0%); warnings alone are InProgress; a clean log is Complete.
    #[must_use]
    pub fn to_signal(&self, name: impl Into<String>) -> ComponentSignal {
        let detail = format!(
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        );
        if !self.errors.is_empty() {
            ComponentSignal::missing(name, detail)
        } else if !self.warnings.is_empty() {
            ComponentSignal::in_progress(name, Some(self.warnings.len() as u64), None, detail)
        } else {
            ComponentSignal::complete(name, Some(0), detail)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
