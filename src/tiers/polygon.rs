//! Tier 4 — Footprint/Polygon. The strongest geometric signal: if the fix
//! actually lands inside a fetched building footprint, near-certainty.
//! Otherwise a zone classifier keyed on distance-to-nearest-footprint,
//! refined by motion and by the shared near-window / parallel-walking
//! detectors.

use chrono::Duration;

use super::{near_window_refinement, outdoor_allowed_here, TierContext};
use crate::types::{ClassificationResult, Mode, SignalSource, TierOutcome};

pub fn evaluate(ctx: &TierContext<'_>) -> TierOutcome {
    if ctx.inside_polygon {
        return Some(ClassificationResult::new(Mode::Inside, 0.98, SignalSource::Polygon));
    }

    let d = ctx.nearest_distance;
    let cfg = ctx.cfg;

    if d < 2.0 {
        return Some(ClassificationResult::new(Mode::Inside, 0.90, SignalSource::Polygon));
    }

    if d <= cfg.zone_probably_inside_m {
        return Some(zone_probably_inside(ctx));
    }
    if d <= cfg.zone_uncertain_m {
        return Some(zone_uncertain(ctx));
    }
    if d <= cfg.zone_probably_outside_m {
        return Some(zone_probably_outside(ctx));
    }
    // Well clear of any footprint, the default "outside" catch-all, except
    // a strongly-detected vehicle carries through here exactly as it does
    // in the two nearer zones above, instead of being overwritten the one
    // place building proximity stops being a factor.
    if ctx.motion.is_vehicle {
        return Some(ClassificationResult::new(
            Mode::Vehicle,
            ctx.motion.vehicle_confidence.min(0.95),
            SignalSource::DistanceMotion,
        ));
    }
    Some(ClassificationResult::new(Mode::Outside, 0.90, SignalSource::Polygon))
}

fn zone_probably_inside(ctx: &TierContext<'_>) -> ClassificationResult {
    let d = ctx.nearest_distance;
    let cfg = ctx.cfg;
    let now = ctx.now();

    if ctx.motion.is_stationary && !ctx.motion.is_walking {
        if let Some(outdoor) = stationary_outdoor_indicators(ctx) {
            return outdoor;
        }
        if let Some(refined) = near_window_refinement(ctx.history, now, d, ctx.inside_polygon) {
            return refined;
        }
        let scaled = (0.80 + (cfg.zone_probably_inside_m - d) / cfg.zone_probably_inside_m * 0.10).min(0.95);
        return ClassificationResult::new(Mode::Inside, scaled, SignalSource::DistanceMotion);
    }

    if ctx.motion.is_walking || ctx.motion.is_running {
        // GPS-drift-near-wall: reported accuracy worse than the actual
        // distance to the building, with near-zero effective movement.
        if gps_drift_near_wall(ctx) {
            return ClassificationResult::new(Mode::Inside, 0.75, SignalSource::DistanceMotion);
        }
        if ctx.history.recent_polygon_exit(now, Duration::seconds(cfg.recent_polygon_exit_seconds)) {
            return ClassificationResult::new(Mode::Outside, 0.90, SignalSource::Polygon);
        }
        if let Some(sidewalk) = parallel_walking(ctx) {
            return sidewalk;
        }

        let distance_ratio = 1.0 - (d / cfg.zone_probably_inside_m).min(1.0);
        let mut confidence = 0.50 + distance_ratio * 0.15;

        let sustained_walking = ctx.history.consecutive_activity_duration(now, &[crate::types::Activity::Walking]);
        if sustained_walking >= Duration::seconds(20) {
            confidence += (sustained_walking.num_seconds() as f64 / 60.0 * 0.15).min(0.15);
        }
        if consistent_speed(ctx) {
            confidence += 0.08;
        }
        if moving_away_from_nearest_building(ctx) {
            confidence += 0.10;
        }
        return ClassificationResult::new(Mode::Inside, confidence.min(0.95), SignalSource::DistanceMotion);
    }

    let scaled = (0.80 + (cfg.zone_probably_inside_m - d) / cfg.zone_probably_inside_m * 0.10).min(0.95);
    ClassificationResult::new(Mode::Inside, scaled, SignalSource::DistanceMotion)
}

/// The several "outdoor despite being close to a footprint while
/// stationary" indicators spec.md lists for `zoneProbablyInside`,
/// consolidated behind [`outdoor_allowed_here`] (§9 open question #3).
fn stationary_outdoor_indicators(ctx: &TierContext<'_>) -> Option<ClassificationResult> {
    let now = ctx.now();
    let d = ctx.nearest_distance;

    let (stable, _) = ctx.history.gps_stability(now);
    if stable && ctx.fix.accuracy_m < 25.0 && d >= 15.0 {
        return Some(ClassificationResult::new(Mode::Outside, 0.70, SignalSource::DistanceMotion));
    }
    if ctx.history.sustained_good_accuracy(now) {
        return Some(ClassificationResult::new(Mode::Outside, 0.70, SignalSource::DistanceMotion));
    }
    if outdoor_allowed_here(d, ctx.inside_polygon) && ctx.history.sustained_excellent_gps(now).0 {
        return Some(ClassificationResult::new(Mode::Outside, 0.75, SignalSource::DistanceMotion));
    }
    None
}

fn gps_drift_near_wall(ctx: &TierContext<'_>) -> bool {
    let d = ctx.nearest_distance;
    if !(ctx.fix.accuracy_m > d && d < 15.0) {
        return false;
    }
    let recent = ctx.history.recent_location_history(ctx.now(), Duration::seconds(30));
    if recent.len() < 2 {
        return false;
    }
    let mut total = 0.0;
    for pair in recent.windows(2) {
        total += crate::geometry::haversine_distance(pair[0].coord, pair[1].coord);
    }
    let avg_step = total / (recent.len() - 1) as f64;
    avg_step < 3.0
}

/// Over 30 s of walking near (5–15 m from) a building, steady
/// distance-to-nearest-footprint with real ground covered reads as
/// someone walking the sidewalk alongside it, not entering it.
fn parallel_walking(ctx: &TierContext<'_>) -> Option<ClassificationResult> {
    let now = ctx.now();
    let d = ctx.nearest_distance;
    if !(5.0..=15.0).contains(&d) {
        return None;
    }
    let recent = ctx.history.recent_location_history(now, Duration::seconds(30));
    if recent.len() < 3 {
        return None;
    }

    let mut total_movement = 0.0;
    for pair in recent.windows(2) {
        total_movement += crate::geometry::haversine_distance(pair[0].coord, pair[1].coord);
    }
    if total_movement <= 10.0 {
        return None;
    }

    let distances: Vec<f64> = recent
        .iter()
        .map(|e| crate::geometry::nearest_polygon_distance(e.coord, ctx.footprints))
        .filter(|d| d.is_finite())
        .collect();
    if distances.is_empty() || super::std_dev(&distances) >= 8.0 {
        return None;
    }

    let sustained = ctx.history.consecutive_activity_duration(now, &[crate::types::Activity::Walking])
        >= Duration::seconds(30);
    let confidence = if sustained { 0.85 } else { 0.75 };
    Some(ClassificationResult::new(Mode::Outside, confidence, SignalSource::DistanceMotion))
}

fn consistent_speed(ctx: &TierContext<'_>) -> bool {
    let samples = ctx.history.last_n_motion(5);
    if samples.len() < 3 {
        return false;
    }
    let speeds: Vec<f64> = samples.iter().map(|s| s.speed_mps).collect();
    super::std_dev(&speeds) < 0.5
}

fn moving_away_from_nearest_building(ctx: &TierContext<'_>) -> bool {
    let recent = ctx.history.recent_location_history(ctx.now(), Duration::seconds(30));
    if recent.len() < 2 {
        return false;
    }
    let first = crate::geometry::nearest_polygon_distance(recent[0].coord, ctx.footprints);
    let last = crate::geometry::nearest_polygon_distance(
        recent.last().map(|e| e.coord).unwrap_or(recent[0].coord),
        ctx.footprints,
    );
    first.is_finite() && last.is_finite() && last > first
}

fn zone_uncertain(ctx: &TierContext<'_>) -> ClassificationResult {
    if ctx.motion.is_walking {
        return ClassificationResult::new(Mode::Outside, 0.60, SignalSource::DistanceMotion);
    }
    if ctx.motion.is_vehicle {
        return ClassificationResult::new(Mode::Vehicle, ctx.motion.vehicle_confidence.min(0.75), SignalSource::DistanceMotion);
    }
    ClassificationResult::new(Mode::Inside, 0.70, SignalSource::DistanceMotion)
}

fn zone_probably_outside(ctx: &TierContext<'_>) -> ClassificationResult {
    if ctx.motion.is_vehicle {
        return ClassificationResult::new(Mode::Vehicle, ctx.motion.vehicle_confidence.min(0.80), SignalSource::DistanceMotion);
    }
    ClassificationResult::new(Mode::Outside, 0.70, SignalSource::DistanceMotion)
}
