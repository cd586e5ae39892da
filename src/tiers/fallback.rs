//! Tier 5 — Fallback. Always returns a decision, so the pipeline always
//! terminates: either a cautious `outside` guess justified by motion and
//! accuracy, or `unknown` tagged with the reason a caller can act on. The
//! exact confidence ceiling for the `unknown` case is enforced by
//! [`crate::postprocess`]'s context-threshold step (invariant §3.2); this
//! tier only needs to propose a value clearly below any context
//! threshold so that step's cap is what actually binds.

use chrono::Duration;

use super::TierContext;
use crate::types::{ClassificationReason, ClassificationResult, Mode, SignalSource, TierOutcome};

pub fn evaluate(ctx: &TierContext<'_>) -> TierOutcome {
    let now = ctx.now();
    let moving = ctx.fix.speed_mps.unwrap_or(ctx.motion.avg_speed) > 0.5;

    if ctx.footprint_fetch_failed
        && ctx.fix.accuracy_m < 20.0
        && moving
        && ctx.history.no_indoor_history_within(now, Duration::seconds(300))
    {
        return Some(ClassificationResult::new(Mode::Outside, 0.65, SignalSource::Fallback));
    }

    Some(ClassificationResult::with_reason(
        Mode::Unknown,
        0.50,
        ClassificationReason::BuildingDataUnavailable,
        SignalSource::Fallback,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TiersConfig;
    use crate::history::ObservationHistory;
    use crate::motion::MotionState;
    use crate::types::Fix;
    use chrono::Utc;

    fn motion(avg_speed: f64) -> MotionState {
        MotionState {
            is_stationary: avg_speed < 0.8,
            is_walking: (0.5..2.0).contains(&avg_speed),
            is_running: false,
            is_vehicle: false,
            just_started_moving: false,
            activity: None,
            avg_speed,
            vehicle_confidence: 0.0,
        }
    }

    fn fix(now: chrono::DateTime<Utc>, speed: f64, accuracy: f64) -> Fix {
        Fix { lat: 0.0, lon: 0.0, accuracy_m: accuracy, speed_mps: Some(speed), floor_level: None, t: now }
    }

    #[test]
    fn failed_footprint_fetch_with_good_accuracy_and_motion_guesses_outdoor() {
        let now = Utc::now();
        let history = ObservationHistory::new();
        let m = motion(1.2);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now, 1.2, 10.0),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: f64::INFINITY,
            inside_polygon: false,
            footprint_fetch_failed: true,
            cfg: &cfg,
        };
        let result = evaluate(&ctx).unwrap();
        assert_eq!(result.mode, Mode::Outside);
        assert_eq!(result.confidence, 0.65);
    }

    #[test]
    fn otherwise_collapses_to_unknown_with_reason() {
        let now = Utc::now();
        let history = ObservationHistory::new();
        let m = motion(0.0);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now, 0.0, 10.0),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: f64::INFINITY,
            inside_polygon: false,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        let result = evaluate(&ctx).unwrap();
        assert_eq!(result.mode, Mode::Unknown);
        assert_eq!(result.reason, Some(ClassificationReason::BuildingDataUnavailable));
    }
}
