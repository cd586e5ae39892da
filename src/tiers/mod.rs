//! TierClassifier (C5) — six priority-ordered classification tiers. The
//! first tier to return `Some` wins; later tiers never see a fix a prior
//! tier already decided. Grounded on `agents::specialists::*`, the
//! teacher's own priority-ordered rule-family-per-file layout under one
//! dispatching `mod.rs`.
//!
//! Tier 0 (manual override) is evaluated by [`crate::engine::DetectionEngine`]
//! directly — it short-circuits the whole pipeline, including the
//! pre-step that updates polygon occupancy, so it doesn't belong to this
//! chain. Tier 3 (pressure) never returns a decision of its own; it lives
//! in [`crate::postprocess`] as a validation-only boost applied to
//! whichever tier below did decide.

pub mod accuracy_pattern;
pub mod fallback;
pub mod floor;
pub mod manual_override;
pub mod polygon;

use chrono::{DateTime, Duration, Utc};

use crate::config::TiersConfig;
use crate::history::ObservationHistory;
use crate::motion::MotionState;
use crate::types::{ClassificationResult, Fix, Footprint};

/// Everything a tier needs to read. Tiers take this by reference and
/// return a decision or "pass" — they never mutate history themselves;
/// mutation (polygon occupancy, floor timestamps) happens in the engine's
/// pre-step per spec.md §4.5.
pub struct TierContext<'a> {
    pub fix: Fix,
    pub history: &'a ObservationHistory,
    pub motion: &'a MotionState,
    pub footprints: &'a [Footprint],
    pub nearest_distance: f64,
    pub inside_polygon: bool,
    pub footprint_fetch_failed: bool,
    pub cfg: &'a TiersConfig,
}

impl TierContext<'_> {
    pub fn now(&self) -> DateTime<Utc> {
        self.fix.t
    }
}

/// spec.md §9 open question #3: the "polygon absolutism" branches that
/// recur across zones are consolidated into this one predicate.
pub fn outdoor_allowed_here(distance_m: f64, inside_polygon: bool) -> bool {
    !inside_polygon && distance_m >= 5.0
}

/// Runs tiers 1 (floor) → 2 (accuracy pattern) → 4 (footprint/polygon) →
/// 5 (fallback) in order, returning the first decision.
pub fn classify(ctx: &TierContext<'_>) -> ClassificationResult {
    floor::evaluate(ctx)
        .or_else(|| accuracy_pattern::evaluate(ctx))
        .or_else(|| polygon::evaluate(ctx))
        .or_else(|| fallback::evaluate(ctx))
        .expect("fallback tier always returns a decision")
}

/// Shared "near-window" refinement used by both Tier 2's definitive-outdoor
/// pattern and Tier 4's `zoneProbablyInside` stationary branch (spec.md
/// §4.5). Returns `None` to mean "let the outdoor outcome stand" (the
/// bus-stop case).
pub fn near_window_refinement(
    history: &ObservationHistory,
    now: DateTime<Utc>,
    nearest_distance: f64,
    inside_polygon: bool,
) -> Option<ClassificationResult> {
    use crate::types::{Activity, Mode, SignalSource};

    let stationary_for = history.consecutive_activity_duration(now, &[Activity::Stationary]);

    if stationary_for > Duration::seconds(120) && nearest_distance < 5.0 {
        return Some(ClassificationResult::new(Mode::Inside, 0.85, SignalSource::AccuracyPattern));
    }
    if (5.0..15.0).contains(&nearest_distance)
        && stationary_for > Duration::seconds(300)
        && inside_polygon
    {
        return Some(ClassificationResult::new(Mode::Inside, 0.80, SignalSource::AccuracyPattern));
    }
    None
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outdoor_allowed_here_requires_outside_polygon_and_distance() {
        assert!(outdoor_allowed_here(5.0, false));
        assert!(!outdoor_allowed_here(5.0, true));
        assert!(!outdoor_allowed_here(4.9, false));
    }
}
