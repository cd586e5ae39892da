//! Property-based coverage of spec.md §8's invariants. Each property is
//! checked against the smallest unit that actually owns it, rather than
//! routing everything through the full `DetectionEngine` (most of these
//! are structural guarantees a single component is responsible for).

use chrono::{Duration, Utc};
use context_engine::config::{DetectionConfig, MotionConfig, TiersConfig};
use context_engine::history::ObservationHistory;
use context_engine::motion::MotionAnalyzer;
use context_engine::postprocess::{self, PostProcessContext};
use context_engine::tiers::{self, TierContext};
use context_engine::types::{
    Activity, AccuracySample, ClassificationResult, Coord, Fix, HistoryEntry, Mode, MotionSample,
    SignalSource,
};
use proptest::prelude::*;

fn motion_idle() -> context_engine::motion::MotionState {
    context_engine::motion::MotionState {
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

proptest! {
    /// No history entry ever carries `mode == unknown` — `record_location_history`
    /// rejects it outright, regardless of confidence or source.
    #[test]
    fn history_never_records_unknown_mode(
        confidence in 0.0_f64..=1.0,
        accuracy in 0.0_f64..200.0,
    ) {
        let mut history = ObservationHistory::new();
        let cfg = context_engine::config::HistoryConfig::default();
        let now = Utc::now();
        history.record_location_history(
            HistoryEntry {
                mode: Mode::Unknown,
                confidence,
                coord: Coord { lat: 0.0, lon: 0.0 },
                accuracy: Some(accuracy),
                source: SignalSource::Fallback,
                reason: None,
                t: now,
            },
            &cfg,
        );
        prop_assert!(history.location_history_is_empty());
    }

    /// A polygon exit is only ever recorded when the entry and exit
    /// coordinates are at least 10 m apart (haversine).
    #[test]
    fn polygon_exit_requires_minimum_distance(
        lat_offset_deg in -0.01_f64..0.01,
        lon_offset_deg in -0.01_f64..0.01,
    ) {
        let mut history = ObservationHistory::new();
        let now = Utc::now();
        let entry_coord = Coord { lat: 40.0, lon: -73.0 };
        history.polygon_entry("b1".into(), now, entry_coord);

        let exit_coord = Coord { lat: 40.0 + lat_offset_deg, lon: -73.0 + lon_offset_deg };
        let distance = context_engine::geometry::haversine_distance(entry_coord, exit_coord);
        let recorded = history.polygon_exit("b1", now + Duration::seconds(1), exit_coord);

        if recorded {
            prop_assert!(distance >= 10.0, "recorded an exit only {distance} m from entry");
        } else {
            prop_assert!(distance < 10.0, "rejected an exit that was {distance} m from entry");
        }
    }

    /// Cyclist-tagged motion never yields a vehicle classification,
    /// regardless of speed.
    #[test]
    fn cyclist_activity_never_produces_vehicle(
        speed in 3.0_f64..10.0,
    ) {
        let mut analyzer = MotionAnalyzer::new();
        let now = Utc::now();
        let samples: Vec<MotionSample> = (0..6)
            .map(|i| MotionSample { speed_mps: speed, activity: Activity::Cycling, t: now - Duration::seconds(50 - i * 10) })
            .collect();
        let cfg = MotionConfig::default();
        let state = analyzer.analyze(&samples, now, &cfg);
        prop_assert_eq!(state.vehicle_confidence, 0.0);
        prop_assert!(!state.is_vehicle);
    }

    /// Tier 2 (accuracy pattern) is vetoed entirely while inside a polygon —
    /// it can never override the polygon tier's call, `outside` included.
    #[test]
    fn accuracy_pattern_never_fires_inside_a_polygon(
        accuracies in proptest::collection::vec(1.0_f64..100.0, 5..10),
    ) {
        let now = Utc::now();
        let mut history = ObservationHistory::new();
        let history_cfg = context_engine::config::HistoryConfig::default();
        for (i, a) in accuracies.iter().enumerate() {
            history.record_accuracy(
                AccuracySample { accuracy_m: *a, coord: Coord { lat: 0.0, lon: 0.0 }, t: now - Duration::seconds((accuracies.len() - i) as i64) },
                &history_cfg,
            );
        }
        let motion = motion_idle();
        let cfg = TiersConfig::default();
        let ctx = TierContext {
            fix: Fix { lat: 0.0, lon: 0.0, accuracy_m: *accuracies.last().unwrap(), speed_mps: Some(0.0), floor_level: None, t: now },
            history: &history,
            motion: &motion,
            footprints: &[],
            nearest_distance: 0.0,
            inside_polygon: true,
            footprint_fetch_failed: false,
            cfg: &cfg,
        };
        prop_assert!(tiers::accuracy_pattern::evaluate(&ctx).is_none());
    }

    /// Every classification `postprocess::apply` returns has a confidence
    /// clamped to [0, 1], and an `unknown` verdict never exceeds the
    /// vehicle threshold's collapse ceiling (the loosest of the
    /// context thresholds).
    #[test]
    fn published_confidence_stays_in_range(
        accuracy in 1.0_f64..250.0,
        proposed_confidence in 0.0_f64..1.0,
        is_walking in any::<bool>(),
    ) {
        let now = Utc::now();
        let cfg = DetectionConfig::default();
        let mut history = ObservationHistory::new();
        history.record_accuracy(
            AccuracySample { accuracy_m: accuracy.min(149.0).max(1.0), coord: Coord { lat: 0.0, lon: 0.0 }, t: now },
            &cfg.history,
        );
        let motion = context_engine::motion::MotionState {
            is_stationary: !is_walking,
            is_walking,
            is_running: false,
            is_vehicle: false,
            just_started_moving: false,
            activity: None,
            avg_speed: if is_walking { 1.2 } else { 0.0 },
            vehicle_confidence: 0.0,
        };
        let mut mode_lock = None;
        let fix = Fix { lat: 0.0, lon: 0.0, accuracy_m: accuracy, speed_mps: Some(0.0), floor_level: None, t: now };
        let mut ctx = PostProcessContext {
            fix,
            motion: &motion,
            history: &mut history,
            mode_lock: &mut mode_lock,
            nearest_distance: 200.0,
            cfg: &cfg.postprocess,
            mode_lock_cfg: &cfg.mode_lock,
            drift_cfg: &cfg.drift,
            history_cfg: &cfg.history,
        };
        let proposed = ClassificationResult::new(Mode::Outside, proposed_confidence, SignalSource::DistanceMotion);
        let result = postprocess::apply(proposed, &mut ctx);

        prop_assert!((0.0..=1.0).contains(&result.confidence), "confidence {} out of range", result.confidence);
        if result.mode == Mode::Unknown {
            prop_assert!(result.confidence <= cfg.postprocess.context_threshold_vehicle - 0.05);
        }
    }
}
