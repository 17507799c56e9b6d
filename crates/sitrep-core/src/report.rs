//! # Status Report
//!
//! The aggregated answer to "where does this project stand?": readiness,
//! current phase, recent error history, and recommended next steps.

use serde::{Deserialize, Serialize};

use crate::diagnostics::ErrorRecord;
use crate::score::ReadinessReport;
use crate::{ComponentStatus, Timestamp};

/// Maximum length of a summarized error message.
const SUMMARY_MESSAGE_MAX: usize = 120;

// =============================================================================
// ERROR SUMMARY
// =============================================================================

/// A compact view of one tracked error for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Hex fingerprint digest.
    pub fingerprint: String,

    /// Raw message, truncated for display.
    pub message: String,

    /// Total sightings.
    pub occurrence_count: u64,

    /// Most recent sighting.
    pub last_seen: Timestamp,

    /// Whether at least one solution is linked.
    pub has_solution: bool,
}

impl ErrorSummary {
    /// Summarize a stored record.
    #[must_use]
    pub fn from_record(record: &ErrorRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.as_str().to_string(),
            message: truncate_message(&record.raw_message),
            occurrence_count: record.occurrence_count,
            last_seen: record.last_seen,
            has_solution: !record.linked_solutions.is_empty(),
        }
    }
}

fn truncate_message(raw: &str) -> String {
    if raw.chars().count() <= SUMMARY_MESSAGE_MAX {
        return raw.to_string();
    }
    let cut: String = raw.chars().take(SUMMARY_MESSAGE_MAX.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}

// =============================================================================
// STATUS REPORT
// =============================================================================

/// The full aggregated status picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Weighted readiness picture.
    pub readiness: ReadinessReport,

    /// Phase set by the most recent phase change, if any.
    pub current_phase: Option<String>,

    /// Recently seen errors, most recent first.
    pub recent_errors: Vec<ErrorSummary>,

    /// Recommended next steps, least-ready component first.
    pub next_steps: Vec<String>,

    /// Notes about parts of the picture that could not be gathered.
    pub degraded: Vec<String>,
}

/// Derive recommended next steps from a readiness report.
///
/// Available components below 100% are listed least-ready first; ties keep
/// their signal order (the weight table's declaration order). Unavailable
/// components are excluded: they surface through `degraded` instead.
#[must_use]
pub fn next_steps(readiness: &ReadinessReport) -> Vec<String> {
    let mut pending: Vec<(f64, String)> = readiness
        .component_breakdown
        .iter()
        .filter_map(|score| {
            let pct = score.percentage?;
            if pct >= 100.0 {
                return None;
            }
            let step = match score.signal.status {
                ComponentStatus::Missing => {
                    format!("Implement the '{}' component", score.signal.name)
                }
                _ => format!(
                    "Finish the '{}' component ({:.0}% complete)",
                    score.signal.name, pct
                ),
            };
            Some((pct, step))
        })
        .collect();

    // Stable sort preserves signal order among equally-ready components.
    pending.sort_by(|a, b| a.0.total_cmp(&b.0));

    if pending.is_empty() {
        return vec!["All tracked components report complete".to_string()];
    }
    pending.into_iter().map(|(_, step)| step).collect()
}

// =============================================================================
// TESTS
// =============================================================================
