//! Tier-level and post-process-level coverage of spec.md §8 scenarios that
//! need a fetched footprint under direct control — S2 (bus-stop wait) and
//! S3 (building entry) — exercised against `tiers::classify` and
//! `postprocess::apply` directly rather than through the full engine (whose
//! footprint fetch can't be pointed at a fixture polygon without a mock
//! HTTP server).

use chrono::{Duration, Utc};
use context_engine::config::{DetectionConfig, TiersConfig};
use context_engine::history::ObservationHistory;
use context_engine::motion::MotionState;
use context_engine::postprocess::{self, PostProcessContext};
use context_engine::tiers::{self, TierContext};
use context_engine::types::{AccuracySample, ClassificationResult, Coord, Fix, Mode, SignalSource};

fn stationary() -> MotionState {
    MotionState {
        is_stationary: true,
        is_walking: false,
        is_running: false,
        is_vehicle: false,
        just_started_moving: false,
        activity: None,
        avg_speed: 0.0,
        vehicle_confidence: 0.0,
    }
}

fn fix(now: chrono::DateTime<Utc>, accuracy: f64) -> Fix {
    Fix { lat: 0.0, lon: 0.0, accuracy_m: accuracy, speed_mps: Some(0.0), floor_level: None, t: now }
}

/// S2. A bus-stop wait: stationary, accuracy holding around 10 m, 8 m from
/// the nearest footprint, never inside a polygon, sustained 180 s. The
/// engine must not call this `inside` just because a building happens to
/// be nearby — near-window refinement only fires at < 5 m or while
/// actually inside a polygon, neither of which holds here.
#[test]
fn bus_stop_wait_does_not_misclassify_inside() {
    let now = Utc::now();
    let mut history = ObservationHistory::new();
    let history_cfg = context_engine::config::HistoryConfig::default();
    for i in 0..180 {
        history.record_accuracy(
            AccuracySample { accuracy_m: 10.0, coord: Coord { lat: 0.0, lon: 0.0 }, t: now - Duration::seconds(180 - i) },
            &history_cfg,
        );
    }

    let motion = stationary();
    let cfg = TiersConfig::default();
    let ctx = TierContext {
        fix: fix(now, 10.0),
        history: &history,
        motion: &motion,
        footprints: &[],
        nearest_distance: 8.0,
        inside_polygon: false,
        footprint_fetch_failed: false,
        cfg: &cfg,
    };

    let result = tiers::classify(&ctx);
    assert_eq!(result.mode, Mode::Outside, "bus-stop wait near a building must not read as inside");
    assert!(result.confidence >= 0.60, "confidence was {}", result.confidence);
}

/// S3 (tier level). A point landing inside a fetched footprint is
/// near-certain, regardless of anything else in view.
#[test]
fn building_entry_is_near_certain_inside() {
    let now = Utc::now();
    let history = ObservationHistory::new();
    let motion = MotionState {
        is_stationary: false,
        is_walking: true,
        is_running: false,
        is_vehicle: false,
        just_started_moving: false,
        activity: None,
        avg_speed: 1.2,
        vehicle_confidence: 0.0,
    };
    let cfg = TiersConfig::default();
    let ctx = TierContext {
        fix: fix(now, 10.0),
        history: &history,
        motion: &motion,
        footprints: &[],
        nearest_distance: 0.0,
        inside_polygon: true,
        footprint_fetch_failed: false,
        cfg: &cfg,
    };

    let result = tiers::classify(&ctx);
    assert_eq!(result.mode, Mode::Inside);
    assert_eq!(result.confidence, 0.98);
    assert_eq!(result.source, SignalSource::Polygon);
}

/// S3 (post-process level). A confident building-entry classification
/// retroactively purges weak recent `outside` entries (GPS drift on
/// approach) from the last 90 s of location history, but leaves a
/// confident outdoor entry alone.
#[test]
fn confident_building_entry_purges_weak_recent_outdoor_history() {
    let now = Utc::now();
    let cfg = DetectionConfig::default();
    let mut history = ObservationHistory::new();

    history.record_location_history(
        context_engine::types::HistoryEntry {
            mode: Mode::Outside,
            confidence: 0.55,
            coord: Coord { lat: 0.0, lon: 0.0 },
            accuracy: Some(20.0),
            source: SignalSource::DistanceMotion,
            reason: None,
            t: now - Duration::seconds(30),
        },
        &cfg.history,
    );
    history.record_location_history(
        context_engine::types::HistoryEntry {
            mode: Mode::Outside,
            confidence: 0.92,
            coord: Coord { lat: 0.0, lon: 0.0 },
            accuracy: Some(8.0),
            source: SignalSource::DistanceMotion,
            reason: None,
            t: now - Duration::seconds(20),
        },
        &cfg.history,
    );
    history.record_accuracy(
        AccuracySample { accuracy_m: 5.0, coord: Coord { lat: 0.0, lon: 0.0 }, t: now },
        &cfg.history,
    );

    let motion = stationary();
    let mut mode_lock = None;
    let mut pp_ctx = PostProcessContext {
        fix: fix(now, 5.0),
        motion: &motion,
        history: &mut history,
        mode_lock: &mut mode_lock,
        nearest_distance: 0.0,
        cfg: &cfg.postprocess,
        mode_lock_cfg: &cfg.mode_lock,
        drift_cfg: &cfg.drift,
        history_cfg: &cfg.history,
    };

    let proposed = ClassificationResult::new(Mode::Inside, 0.98, SignalSource::Polygon);
    let result = postprocess::apply(proposed, &mut pp_ctx);

    assert_eq!(result.mode, Mode::Inside);
    assert_eq!(result.confidence, 0.98);

    let remaining = history.recent_location_history(now, Duration::seconds(90));
    assert!(
        remaining.iter().all(|e| !(e.mode == Mode::Outside && e.confidence < 0.85)),
        "weak outdoor entries should have been purged: {remaining:?}"
    );
    assert!(
        remaining.iter().any(|e| e.mode == Mode::Outside && e.confidence >= 0.85),
        "confident outdoor entry should survive the purge"
    );
}
