//! # Readiness Scorer
//!
//! Combines collector signals into a single weighted percentage plus a
//! per-component breakdown.
//!
//! Unavailable signals are excluded from *both* the numerator and the
//! denominator of the weighted average: a probe that failed to run must not
//! drag the score toward zero. When nothing at all is available the report
//! carries an explicit `no_data` flag instead of a misleading zero.

use serde::{Deserialize, Serialize};

use crate::signal::ComponentSignal;
use crate::{Health, Timestamp};

// =============================================================================
// THRESHOLD CONFIGURATION
// =============================================================================

/// Minimum percentage for Excellent health.
pub const EXCELLENT_MIN: f64 = 85.0;

/// Minimum percentage for Warning health; below this is Critical.
pub const WARNING_MIN: f64 = 50.0;

/// Percentage assigned to InProgress components without a usable estimate.
pub const FALLBACK_PROGRESS_PCT: f64 = 50.0;

/// Derive the health band from an overall percentage.
#[must_use]
pub fn health_for(percentage: f64) -> Health {
    if percentage >= EXCELLENT_MIN {
        Health::Excellent
    } else if percentage >= WARNING_MIN {
        Health::Warning
    } else {
        Health::Critical
    }
}

// =============================================================================
// WEIGHT TABLE
// =============================================================================

/// Registered component weights, in declaration order.
///
/// Declaration order is the tiebreaker for equally-ready components in the
/// recommended-next-steps list. A signal name not present here has weight 0
/// and is excluded from the average (predictable degradation, not an error).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    entries: Vec<(String, f64)>,
}

impl WeightTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration; later entries override earlier ones
    /// with the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, weight: f64) -> Self {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = weight;
        } else {
            self.entries.push((name, weight));
        }
        self
    }

    /// Weight for a signal name; unknown names get 0.
    #[must_use]
    pub fn weight_of(&self, name: &str) -> f64 {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Registered names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// READINESS REPORT
// =============================================================================

/// One component's contribution to the readiness picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    /// The observed signal.
    pub signal: ComponentSignal,

    /// Weight assigned by the table (0 for unregistered names).
    pub weight: f64,

    /// Status converted to a percentage; `None` for Unavailable signals.
    pub percentage: Option<f64>,
}

/// The weighted readiness picture. Immutable once produced; a new report
/// supersedes but never mutates a prior one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// Weighted average over available, weighted components (0-100).
    pub overall_percentage: f64,

    /// Per-component breakdown in signal order.
    pub component_breakdown: Vec<ComponentScore>,

    /// Health band for `overall_percentage`.
    pub health: Health,

    /// True when no available, weighted signal contributed; the zero score
    /// means "no data", not "verified zero readiness".
    pub no_data: bool,

    /// When the report was generated.
    pub generated_at: Timestamp,
}

/// Convert a signal's status into a percentage; `None` for Unavailable.
///
/// InProgress uses a linear metric-based estimate when the signal carries
/// both an observed and an expected metric, and 50 otherwise.
#[must_use]
pub fn status_percentage(signal: &ComponentSignal) -> Option<f64> {
    use crate::ComponentStatus::{Complete, InProgress, Missing, Unavailable};
    match signal.status {
        Complete => Some(100.0),
        Missing => Some(0.0),
        Unavailable => None,
        InProgress => match (signal.metric, signal.expected) {
            (Some(found), Some(expected)) if expected > 0 => {
                Some(((found as f64 / expected as f64) * 100.0).min(100.0))
            }
            _ => Some(FALLBACK_PROGRESS_PCT),
        },
    }
}

/// Compute a readiness report from collected signals and registered weights.
///
/// Pure function: same inputs, same report.
#[must_use]
pub fn compute(signals: &[ComponentSignal], weights: &WeightTable, now: Timestamp) -> ReadinessReport {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    let component_breakdown: Vec<ComponentScore> = signals
        .iter()
        .map(|signal| {
            let weight = weights.weight_of(&signal.name);
            let percentage = status_percentage(signal);
            if let Some(pct) = percentage {
                if weight > 0.0 {
                    weighted_sum += weight * pct;
                    weight_total += weight;
                }
            }
            ComponentScore {
                signal: signal.clone(),
                weight,
                percentage,
            }
        })
        .collect();

    let no_data = weight_total <= 0.0;
    let overall_percentage = if no_data { 0.0 } else { weighted_sum / weight_total };
    let health = if no_data { Health::Critical } else { health_for(overall_percentage) };

    ReadinessReport {
        overall_percentage,
        component_breakdown,
        health,
        no_data,
        generated_at: now,
    }
}

// =============================================================================
// TESTS
// =============================================================================
