//! Tier 2 — Accuracy Pattern. GPS accuracy readings have a characteristic
//! shape indoors (large, noisy — multipath off walls/ceiling) versus
//! outdoors (small, steady — clear sky view). The avg/stdev bands below
//! are spec.md's one reviewed rule table (§9: "adding one requires
//! code-level review") and are deliberately code constants, not config
//! fields — see `config::detection_config`'s module doc.

use super::{mean, near_window_refinement, std_dev, TierContext};
use crate::types::{ClassificationResult, Mode, SignalSource, TierOutcome};

const MIN_SAMPLES: usize = 5;
const WINDOW: usize = 10;

pub fn evaluate(ctx: &TierContext<'_>) -> TierOutcome {
    // Polygon veto: a point already inside a footprint is Tier 4's call.
    if ctx.inside_polygon {
        return None;
    }

    let samples = ctx.history.last_n_accuracy_chronological(WINDOW);
    if samples.len() < MIN_SAMPLES {
        return None;
    }
    let values: Vec<f64> = samples.iter().map(|s| s.accuracy_m).collect();
    let avg = mean(&values);
    let stdev = std_dev(&values);

    if let Some(result) = underground_detection(ctx) {
        return Some(result);
    }

    if ctx.motion.is_walking {
        if let Some(result) = transitional(&values) {
            return Some(result);
        }
    }

    // Definitive indoor.
    if avg > 35.0 && stdev > 15.0 {
        return Some(ClassificationResult::new(Mode::Inside, 0.85, SignalSource::AccuracyPattern));
    }

    // Definitive outdoor, refined by the shared near-window predicate.
    if avg < 12.0 && stdev < 4.0 {
        if let Some(refined) = near_window_refinement(ctx.history, ctx.now(), ctx.nearest_distance, ctx.inside_polygon) {
            return Some(refined);
        }
        return Some(ClassificationResult::new(Mode::Outside, 0.85, SignalSource::AccuracyPattern));
    }

    if (15.0..28.0).contains(&avg) && (6.0..=15.0).contains(&stdev) {
        if ctx.motion.is_stationary {
            return Some(ClassificationResult::new(Mode::Inside, 0.70, SignalSource::AccuracyPattern));
        }
        if ctx.motion.is_walking && stdev > 10.0 {
            return Some(ClassificationResult::new(Mode::Outside, 0.65, SignalSource::AccuracyPattern));
        }
        if ctx.motion.is_walking && stdev <= 10.0 {
            return Some(ClassificationResult::new(Mode::Inside, 0.65, SignalSource::AccuracyPattern));
        }
    }

    if (20.0..40.0).contains(&avg) && (10.0..=25.0).contains(&stdev) {
        if ctx.motion.is_walking || ctx.motion.is_running {
            return Some(ClassificationResult::new(Mode::Outside, 0.80, SignalSource::AccuracyPattern));
        }
        if ctx.motion.is_vehicle {
            return Some(ClassificationResult::new(Mode::Vehicle, 0.75, SignalSource::AccuracyPattern));
        }
        // Ambiguous while stationary: no decision, fall through to Tier 4.
        if ctx.motion.is_stationary {
            return None;
        }
    }

    if (12.0..20.0).contains(&avg) && (4.0..10.0).contains(&stdev) {
        if ctx.motion.is_walking || ctx.motion.is_running {
            return Some(ClassificationResult::new(Mode::Outside, 0.85, SignalSource::AccuracyPattern));
        }
        if ctx.motion.is_stationary {
            return Some(ClassificationResult::new(Mode::Outside, 0.75, SignalSource::AccuracyPattern));
        }
    }

    None
}

/// A barometer reading well below the surface baseline, corroborated by
/// excellent GPS and no polygon occupancy, is near-definitive for a
/// basement/underground space — unless GPS is *so* good it more likely
/// means the user is simply standing at the bottom of a hill outdoors.
fn underground_detection(ctx: &TierContext<'_>) -> Option<ClassificationResult> {
    let pressure = ctx.history.latest_pressure_sample()?;
    if pressure.relative_altitude_m >= -2.0 {
        return None;
    }
    let (excellent, avg_accuracy, _duration) = ctx.history.sustained_excellent_gps(ctx.now());
    if !excellent || ctx.inside_polygon {
        return None;
    }
    if avg_accuracy < 10.0 {
        // GPS this good more plausibly means "outdoors, downhill" — let
        // later tiers call it rather than claim underground.
        return None;
    }
    Some(ClassificationResult::new(Mode::Inside, 0.90, SignalSource::AccuracyPattern))
}

/// Compares the first half vs second half of the accuracy window while
/// walking: a clear improvement suggests the user just left a building,
/// a clear degradation suggests they just entered one.
fn transitional(chronological_values: &[f64]) -> Option<ClassificationResult> {
    if chronological_values.len() < WINDOW {
        return None;
    }
    let half = chronological_values.len() / 2;
    let first_avg = mean(&chronological_values[..half]);
    let second_avg = mean(&chronological_values[half..]);
    let delta = second_avg - first_avg;

    if delta <= -10.0 {
        return Some(ClassificationResult::new(Mode::Outside, 0.70, SignalSource::AccuracyPattern));
    }
    if delta >= 10.0 {
        return Some(ClassificationResult::new(Mode::Inside, 0.70, SignalSource::AccuracyPattern));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TiersConfig;
    use crate::history::ObservationHistory;
    use crate::motion::MotionState;
    use crate::types::{AccuracySample, Coord, Fix};
    use chrono::{Duration, Utc};

    fn motion(stationary: bool, walking: bool, running: bool, vehicle: bool) -> MotionState {
        MotionState {
            is_stationary: stationary,
            is_walking: walking,
            is_running: running,
            is_vehicle: vehicle,
            just_started_moving: false,
            activity: None,
            avg_speed: 0.0,
            vehicle_confidence: if vehicle { 0.9 } else { 0.0 },
        }
    }

    fn fix(now: chrono::DateTime<Utc>) -> Fix {
        Fix { lat: 0.0, lon: 0.0, accuracy_m: 10.0, speed_mps: Some(0.0), floor_level: None, t: now }
    }

    fn push_constant_accuracy(history: &mut ObservationHistory, now: chrono::DateTime<Utc>, value: f64, n: i64) {
        let cfg = crate::config::HistoryConfig::default();
        for i in 0..n {
            history.record_accuracy(
                AccuracySample { accuracy_m: value, coord: Coord { lat: 0.0, lon: 0.0 }, t: now - Duration::seconds(n - i) },
                &cfg,
            );
        }
    }

    #[test]
    fn definitive_indoor_pattern_is_recognized() {
        let now = Utc::now();
        let mut history = ObservationHistory::new();
        push_constant_accuracy(&mut history, now, 45.0, 10);
        // Inject variance so stdev clears 15.
        for (i, v) in [20.0, 60.0, 25.0, 55.0, 30.0, 65.0, 20.0, 60.0, 25.0, 55.0].into_iter().enumerate() {
            let cfg = crate::config::HistoryConfig::default();
            history.record_accuracy(
                AccuracySample { accuracy_m: v, coord: Coord { lat: 0.0, lon: 0.0 }, t: now - Duration::seconds(10 - i as i64) },
                &cfg,
            );
        }
        let m = motion(true, false, false, false);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: f64::INFINITY,
            inside_polygon: false,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        let result = evaluate(&ctx).unwrap();
        assert_eq!(result.mode, Mode::Inside);
    }

    #[test]
    fn definitive_outdoor_pattern_is_recognized() {
        let now = Utc::now();
        let mut history = ObservationHistory::new();
        push_constant_accuracy(&mut history, now, 8.0, 10);
        let m = motion(true, false, false, false);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: 500.0,
            inside_polygon: false,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        let result = evaluate(&ctx).unwrap();
        assert_eq!(result.mode, Mode::Outside);
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn inside_polygon_is_vetoed_to_no_decision() {
        let now = Utc::now();
        let mut history = ObservationHistory::new();
        push_constant_accuracy(&mut history, now, 8.0, 10);
        let m = motion(true, false, false, false);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: 0.0,
            inside_polygon: true,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        assert!(evaluate(&ctx).is_none());
    }

    #[test]
    fn too_few_samples_yields_no_decision() {
        let now = Utc::now();
        let mut history = ObservationHistory::new();
        push_constant_accuracy(&mut history, now, 8.0, 3);
        let m = motion(true, false, false, false);
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: fix(now),
            history: &history,
            motion: &m,
            footprints: &[],
            nearest_distance: 500.0,
            inside_polygon: false,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        assert!(evaluate(&ctx).is_none());
    }
}
