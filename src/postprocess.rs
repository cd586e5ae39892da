//! PostProcessor (C6) — the stateful stabilization stage applied to
//! whatever the tier pipeline just decided. Ten steps, run in the fixed
//! order spec.md §4.6 lists: accuracy penalty, pressure boost, context
//! threshold, cold-start guard, GPS ceiling/timeout, history append,
//! stable-mode vote, drift detection, mode-lock enforcement.
//!
//! Grounded on `strategic::aggregation`'s weighted-average/slope idiom
//! (reused here for the decay-weighted vote) and `strategic::actor`'s
//! multi-signal decision combination.

use chrono::Duration;

use crate::config::{DriftConfig, HistoryConfig, ModeLockConfig, PostProcessConfig};
use crate::history::ObservationHistory;
use crate::motion::MotionState;
use crate::types::{
    Activity, ClassificationReason, ClassificationResult, DriftSample, Fix, HistoryEntry, Mode,
    ModeLock, SignalSource,
};

/// Everything the post-processing stage needs, beyond the tier's proposed
/// result: the fix that produced it, the mutable history it appends to and
/// reads back from, and the mode lock it may create, enforce, or break.
pub struct PostProcessContext<'a> {
    pub fix: Fix,
    pub motion: &'a MotionState,
    pub history: &'a mut ObservationHistory,
    pub mode_lock: &'a mut Option<ModeLock>,
    pub nearest_distance: f64,
    pub cfg: &'a PostProcessConfig,
    pub mode_lock_cfg: &'a ModeLockConfig,
    pub drift_cfg: &'a DriftConfig,
    pub history_cfg: &'a HistoryConfig,
}

/// Runs the full post-processing pipeline on a tier's proposed result and
/// returns the classification to publish.
pub fn apply(proposed: ClassificationResult, ctx: &mut PostProcessContext<'_>) -> ClassificationResult {
    let now = ctx.fix.t;
    let mut result = proposed;

    result.confidence *= gps_accuracy_penalty(ctx.fix.accuracy_m, ctx.cfg);
    result.confidence += pressure_validation_boost(ctx.history, now, ctx.motion, result.mode, ctx.cfg);
    result.confidence = result.confidence.clamp(0.0, 1.0);

    let threshold = context_threshold(&result, ctx);
    if result.confidence < threshold {
        result = ClassificationResult::with_reason(
            Mode::Unknown,
            (threshold - 0.05).max(0.0),
            ClassificationReason::InsufficientEvidence,
            result.source,
        );
    }

    if ctx.history.location_history_is_empty()
        && ctx.nearest_distance > ctx.cfg.cold_start_distance_m
        && result.confidence < ctx.cfg.cold_start_confidence_ceiling
    {
        result = ClassificationResult::with_reason(
            Mode::Unknown,
            result.confidence,
            ClassificationReason::InsufficientEvidence,
            result.source,
        );
    }

    if ctx.fix.accuracy_m >= ctx.cfg.gps_ceiling_unknown_m {
        result = ClassificationResult::with_reason(
            Mode::Unknown,
            result.confidence,
            ClassificationReason::PoorGpsAccuracy,
            result.source,
        );
    } else if ctx.history.no_accuracy_sample_within(now, Duration::seconds(ctx.cfg.gps_timeout_seconds)) {
        result = ClassificationResult::with_reason(
            Mode::Unknown,
            result.confidence,
            ClassificationReason::PoorGpsAccuracy,
            result.source,
        );
    }

    if result.mode != Mode::Unknown {
        ctx.history.record_location_history(
            HistoryEntry {
                mode: result.mode,
                confidence: result.confidence,
                coord: crate::types::Coord { lat: ctx.fix.lat, lon: ctx.fix.lon },
                accuracy: Some(ctx.fix.accuracy_m),
                source: result.source,
                reason: result.reason,
                t: now,
            },
            ctx.history_cfg,
        );
    }

    // A confident indoor entry retroactively discredits the weak `outside`
    // guesses GPS drift produced while the device was still walking up to
    // the building (spec.md §8 S3).
    if result.mode == Mode::Inside && result.confidence >= 0.95 {
        ctx.history.purge_recent_weak_outdoor(now, Duration::seconds(90), 0.85);
    }

    if let Some((mode, confidence)) = stable_mode_vote(ctx.history, now, ctx.motion, ctx.cfg) {
        result.mode = mode;
        result.confidence = confidence;
        result.reason = None;
    }

    run_drift_detection(&mut result, ctx);
    run_mode_lock(&mut result, ctx);

    result
}

/// 1.0 at ≤ `gps_penalty_floor_m`, falling linearly to 0.5 at
/// `gps_penalty_ceiling_m`, held at 0.5 beyond that.
fn gps_accuracy_penalty(accuracy_m: f64, cfg: &PostProcessConfig) -> f64 {
    if accuracy_m <= cfg.gps_penalty_floor_m {
        return 1.0;
    }
    if accuracy_m >= cfg.gps_penalty_ceiling_m {
        return 0.5;
    }
    let span = cfg.gps_penalty_ceiling_m - cfg.gps_penalty_floor_m;
    1.0 - 0.5 * (accuracy_m - cfg.gps_penalty_floor_m) / span
}

/// Tier 3 — pressure is validation-only. A recent pressure move while
/// walking that agrees with the winning mode nudges confidence up; it
/// never produces a decision on its own.
fn pressure_validation_boost(
    history: &ObservationHistory,
    now: chrono::DateTime<chrono::Utc>,
    motion: &MotionState,
    mode: Mode,
    cfg: &PostProcessConfig,
) -> f64 {
    if !motion.is_walking {
        return 0.0;
    }
    let Some(delta) = history.pressure_delta(now, Duration::seconds(10)) else {
        return 0.0;
    };

    let magnitude = delta.abs();
    if magnitude < 1.0 {
        return 0.0;
    }
    let full = magnitude > 2.0;

    // A pressure *drop* means the user went up (outside); a *rise* means
    // they went down (inside) — barometric pressure falls with altitude.
    let agrees = (delta < 0.0 && mode == Mode::Outside) || (delta > 0.0 && mode == Mode::Inside);
    if !agrees {
        return 0.0;
    }
    if full {
        cfg.pressure_boost_full
    } else {
        cfg.pressure_boost_half
    }
    .min(cfg.pressure_boost_cap)
}

fn context_threshold(result: &ClassificationResult, ctx: &PostProcessContext<'_>) -> f64 {
    let cfg = ctx.cfg;
    if result.mode == Mode::Vehicle {
        return cfg.context_threshold_vehicle;
    }
    if ctx.motion.is_stationary && ctx.nearest_distance <= 15.0 {
        return cfg.context_threshold_near_footprint;
    }
    let walking_for = ctx.history.consecutive_activity_duration(ctx.fix.t, &[Activity::Walking]);
    if walking_for >= Duration::seconds(30) {
        return cfg.context_threshold_sustained_walk;
    }
    if walking_for >= Duration::seconds(15) {
        return cfg.context_threshold_short_walk;
    }
    cfg.context_threshold_default
}

fn source_quality(source: SignalSource) -> f64 {
    match source {
        SignalSource::Floor => 2.0,
        SignalSource::Polygon => 1.5,
        SignalSource::AccuracyPattern | SignalSource::Geofence | SignalSource::DistanceMotion => 1.0,
        SignalSource::PressureChange => 0.8,
        SignalSource::Fallback => 0.7,
        SignalSource::ManualOverride | SignalSource::Tunnel => 1.0,
    }
}

/// The decay-weighted stable-mode vote — §4.6 step 8. When it reaches a
/// decision, its `(mode, confidence)` replaces whatever the tier pipeline
/// and steps 1-7 proposed; this is what keeps a single noisy fix from
/// flapping the published mode (§7: "the stable-vote gate requires ≥ 2
/// samples"). When it abstains (`None` — fewer than two qualifying samples,
/// or the weighted vote's winner doesn't clear the runner-up by 2.5×), the
/// caller's result passes through unchanged.
pub fn stable_mode_vote(
    history: &ObservationHistory,
    now: chrono::DateTime<chrono::Utc>,
    motion: &MotionState,
    cfg: &PostProcessConfig,
) -> Option<(Mode, f64)> {
    let window = if motion.is_stationary {
        Duration::seconds(cfg.vote_window_stationary_seconds)
    } else {
        Duration::seconds(cfg.vote_window_moving_seconds)
    };
    let entries: Vec<HistoryEntry> = history
        .recent_location_history(now, window)
        .into_iter()
        .filter(|e| e.confidence >= cfg.vote_min_confidence)
        .collect();

    // Final override: a very recent, very confident `inside` always wins.
    if let Some(last) = entries.last() {
        if now - last.t <= Duration::seconds(10) && last.mode == Mode::Inside && last.confidence >= 0.95 {
            return Some((Mode::Inside, last.confidence));
        }
    }

    if entries.len() < 2 {
        if let Some(last) = entries.last() {
            if last.mode == Mode::Vehicle && last.confidence >= 0.85 {
                return Some((last.mode, last.confidence));
            }
        }
        return None;
    }

    let last_two = &entries[entries.len() - 2..];
    if last_two[0].mode == last_two[1].mode {
        return Some((last_two[0].mode, last_two[1].confidence));
    }

    if entries.len() < 4 {
        return None;
    }

    weighted_vote(&entries, now, cfg)
}

fn weighted_vote(entries: &[HistoryEntry], now: chrono::DateTime<chrono::Utc>, cfg: &PostProcessConfig) -> Option<(Mode, f64)> {
    let mut weights: std::collections::HashMap<Mode, f64> = std::collections::HashMap::new();
    for entry in entries {
        let age_seconds = (now - entry.t).num_seconds().max(0) as f64;
        let quality = source_quality(entry.source);
        let weight = entry.confidence * (-age_seconds / (60.0 * quality)).exp();
        *weights.entry(entry.mode).or_insert(0.0) += weight;
    }

    let (streak_mode, streak_len, _) = match entries_streak(entries) {
        Some(s) => s,
        None => return None,
    };
    let vehicle_recently = entries
        .iter()
        .rev()
        .take_while(|e| now - e.t <= Duration::seconds(30))
        .any(|e| e.mode == Mode::Vehicle);
    if !(streak_mode == Mode::Outside && vehicle_recently) {
        let bonus = (0.04 * streak_len as f64).min(cfg.vote_streak_bonus_cap);
        *weights.entry(streak_mode).or_insert(0.0) += bonus;
    }

    let mut ranked: Vec<(Mode, f64)> = weights.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (winner, winner_weight) = ranked.first().copied()?;
    let runner_up_weight = ranked.get(1).map(|(_, w)| *w).unwrap_or(0.0);

    if runner_up_weight > 0.0 && winner_weight < runner_up_weight * cfg.vote_winner_factor {
        return None;
    }

    let winning_confidence = entries
        .iter()
        .filter(|e| e.mode == winner)
        .last()
        .map(|e| e.confidence)
        .unwrap_or(0.5);
    Some((winner, winning_confidence))
}

fn entries_streak(entries: &[HistoryEntry]) -> Option<(Mode, usize, f64)> {
    let mut iter = entries.iter().rev();
    let first = iter.next()?;
    let mode = first.mode;
    let mut count = 1;
    for entry in iter {
        if entry.mode != mode {
            break;
        }
        count += 1;
    }
    Some((mode, count, first.confidence))
}

/// Active only while stationary. Pushes the just-computed result into the
/// drift buffer and, on oscillation, forces a lock (or collapses to
/// unknown) rather than letting GPS jitter keep flipping the published
/// mode back and forth.
fn run_drift_detection(result: &mut ClassificationResult, ctx: &mut PostProcessContext<'_>) {
    if !ctx.motion.is_stationary {
        return;
    }
    let now = ctx.fix.t;
    ctx.history.record_drift(
        DriftSample {
            mode: result.mode,
            coord: crate::types::Coord { lat: ctx.fix.lat, lon: ctx.fix.lon },
            confidence: result.confidence,
            t: now,
        },
        Duration::seconds(300),
    );

    let samples = ctx.history.recent_drift_samples(now, Duration::seconds(300));
    let window = ctx.drift_cfg.sample_window;
    if samples.len() < window {
        return;
    }
    let recent = &samples[samples.len() - window..];

    let oscillations = recent.windows(2).filter(|pair| pair[0].mode != pair[1].mode).count();
    if oscillations < ctx.drift_cfg.oscillation_count {
        return;
    }

    let mut total_distance = 0.0;
    for pair in recent.windows(2) {
        total_distance += crate::geometry::haversine_distance(pair[0].coord, pair[1].coord);
    }
    let avg_distance = total_distance / (recent.len() - 1) as f64;
    if avg_distance <= ctx.drift_cfg.min_avg_distance_m {
        return;
    }

    if ctx.history.floor_detection_recent(now, Duration::seconds(ctx.drift_cfg.floor_quiet_seconds)) {
        return;
    }

    let current = recent.last().expect("window non-empty");
    if current.confidence >= ctx.drift_cfg.lock_confidence_current {
        *ctx.mode_lock = Some(ModeLock {
            mode: current.mode,
            started_at: now,
            locked_confidence: ctx.drift_cfg.lock_confidence_current,
        });
        result.mode = current.mode;
        result.confidence = ctx.drift_cfg.lock_confidence_current;
        result.reason = None;
        return;
    }

    if let Some(majority) = majority_mode(recent) {
        *ctx.mode_lock = Some(ModeLock {
            mode: majority,
            started_at: now,
            locked_confidence: ctx.drift_cfg.lock_confidence_majority,
        });
        result.mode = majority;
        result.confidence = ctx.drift_cfg.lock_confidence_majority;
        result.reason = None;
        return;
    }

    *result = ClassificationResult::with_reason(
        Mode::Unknown,
        0.50,
        ClassificationReason::InsufficientEvidence,
        result.source,
    );
}

/// The strict-majority mode among `samples`, or `None` on a tie.
fn majority_mode(samples: &[DriftSample]) -> Option<Mode> {
    let mut counts: std::collections::HashMap<Mode, usize> = std::collections::HashMap::new();
    for s in samples {
        *counts.entry(s.mode).or_insert(0) += 1;
    }
    let mut ranked: Vec<(Mode, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    match ranked.as_slice() {
        [(mode, count), rest @ ..] if rest.first().map(|(_, c)| c < count).unwrap_or(true) => Some(*mode),
        _ => None,
    }
}

/// Creates, enforces, breaks, or expires the mode lock, in that priority
/// order, after drift detection has had its say.
fn run_mode_lock(result: &mut ClassificationResult, ctx: &mut PostProcessContext<'_>) {
    let now = ctx.fix.t;

    if let Some(lock) = ctx.mode_lock.clone() {
        if now - lock.started_at >= Duration::seconds(ctx.mode_lock_cfg.max_duration_seconds) {
            *ctx.mode_lock = None;
        } else if result.mode != lock.mode && result.confidence >= ctx.mode_lock_cfg.break_confidence {
            *ctx.mode_lock = None;
        } else if result.mode != lock.mode {
            result.mode = lock.mode;
            result.confidence = lock.locked_confidence;
            result.reason = None;
            return;
        } else {
            result.confidence = result.confidence.max(lock.locked_confidence);
            return;
        }
    }

    if try_create_mode_lock(result, ctx) {
        let lock = ctx.mode_lock.as_ref().expect("just created");
        result.confidence = result.confidence.max(lock.locked_confidence);
    }
}

fn try_create_mode_lock(result: &ClassificationResult, ctx: &mut PostProcessContext<'_>) -> bool {
    if result.mode == Mode::Unknown || result.confidence < ctx.mode_lock_cfg.create_confidence {
        return false;
    }
    let now = ctx.fix.t;
    let window = Duration::seconds(ctx.mode_lock_cfg.history_window_seconds);
    let recent = ctx.history.recent_location_history(now, window);
    if recent.len() < ctx.mode_lock_cfg.min_samples {
        return false;
    }
    if !recent.iter().all(|e| e.mode == result.mode) {
        return false;
    }
    let mean_confidence = recent.iter().map(|e| e.confidence).sum::<f64>() / recent.len() as f64;
    if mean_confidence < ctx.mode_lock_cfg.create_confidence_floor {
        return false;
    }

    let independent_sources: std::collections::HashSet<SignalSource> = recent
        .iter()
        .map(|e| e.source)
        .filter(|s| {
            matches!(
                s,
                SignalSource::Floor | SignalSource::AccuracyPattern | SignalSource::Polygon | SignalSource::DistanceMotion
            )
        })
        .collect();
    if independent_sources.len() < 2 {
        return false;
    }
    if ctx.nearest_distance <= ctx.mode_lock_cfg.near_footprint_m
        && !independent_sources.contains(&SignalSource::Floor)
        && !independent_sources.contains(&SignalSource::Polygon)
    {
        return false;
    }

    *ctx.mode_lock = Some(ModeLock {
        mode: result.mode,
        started_at: now,
        locked_confidence: result.confidence,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coord;

    #[test]
    fn gps_penalty_is_full_strength_under_floor() {
        let cfg = PostProcessConfig::default();
        assert_eq!(gps_accuracy_penalty(20.0, &cfg), 1.0);
    }

    #[test]
    fn gps_penalty_halves_at_ceiling() {
        let cfg = PostProcessConfig::default();
        assert_eq!(gps_accuracy_penalty(80.0, &cfg), 0.5);
    }

    #[test]
    fn gps_penalty_interpolates_linearly() {
        let cfg = PostProcessConfig::default();
        let mid = gps_accuracy_penalty(60.0, &cfg);
        assert!((mid - 0.75).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_collapses_to_unknown_below_threshold() {
        let mut history = ObservationHistory::new();
        let mut lock = None;
        let motion = MotionState {
            is_stationary: false,
            is_walking: true,
            is_running: false,
            is_vehicle: false,
            just_started_moving: false,
            activity: None,
            avg_speed: 1.0,
            vehicle_confidence: 0.0,
        };
        let cfg = PostProcessConfig::default();
        let mode_lock_cfg = ModeLockConfig::default();
        let drift_cfg = DriftConfig::default();
        let history_cfg = HistoryConfig::default();
        let fix = Fix { lat: 0.0, lon: 0.0, accuracy_m: 10.0, speed_mps: Some(1.0), floor_level: None, t: chrono::Utc::now() };
        let mut ctx = PostProcessContext {
            fix,
            motion: &motion,
            history: &mut history,
            mode_lock: &mut lock,
            nearest_distance: 200.0,
            cfg: &cfg,
            mode_lock_cfg: &mode_lock_cfg,
            drift_cfg: &drift_cfg,
            history_cfg: &history_cfg,
        };
        let proposed = ClassificationResult::new(Mode::Inside, 0.40, SignalSource::DistanceMotion);
        let result = apply(proposed, &mut ctx);
        assert_eq!(result.mode, Mode::Unknown);
        assert_eq!(result.reason, Some(ClassificationReason::InsufficientEvidence));
    }

    /// S5 (spec.md §8): stationary GPS oscillating between inside/outside
    /// calls with real inter-sample jitter should trip drift detection and
    /// lock onto a single mode rather than keep flapping.
    #[test]
    fn oscillating_stationary_classifications_trigger_a_drift_lock() {
        let cfg = PostProcessConfig::default();
        let mode_lock_cfg = ModeLockConfig::default();
        let drift_cfg = DriftConfig::default();
        let history_cfg = HistoryConfig::default();
        let motion = MotionState {
            is_stationary: true,
            is_walking: false,
            is_running: false,
            is_vehicle: false,
            just_started_moving: false,
            activity: None,
            avg_speed: 0.0,
            vehicle_confidence: 0.0,
        };

        let mut history = ObservationHistory::new();
        let mut lock = None;
        let base = chrono::Utc::now();
        let modes = [Mode::Inside, Mode::Outside, Mode::Inside, Mode::Outside, Mode::Inside, Mode::Outside];

        let mut last_result = None;
        for (i, mode) in modes.iter().enumerate() {
            // ~16 m of lat jitter per step, comfortably over the 8 m drift
            // threshold, while accuracy stays well clear of the GPS ceiling.
            let t = base + Duration::seconds(i as i64 * 10);
            let fix = Fix {
                lat: 0.00015 * i as f64,
                lon: 0.0,
                accuracy_m: 20.0,
                speed_mps: Some(0.0),
                floor_level: None,
                t,
            };
            // The GPS-timeout check in `apply` reads accuracy samples
            // independently of the fix passed in; without this the very
            // first cycle would collapse to `unknown` for lack of any
            // recorded accuracy history.
            history.record_accuracy(
                crate::types::AccuracySample { accuracy_m: fix.accuracy_m, coord: Coord { lat: fix.lat, lon: fix.lon }, t },
                &history_cfg,
            );
            let mut ctx = PostProcessContext {
                fix,
                motion: &motion,
                history: &mut history,
                mode_lock: &mut lock,
                nearest_distance: 50.0,
                cfg: &cfg,
                mode_lock_cfg: &mode_lock_cfg,
                drift_cfg: &drift_cfg,
                history_cfg: &history_cfg,
            };
            let proposed = ClassificationResult::new(*mode, 0.72, SignalSource::AccuracyPattern);
            last_result = Some(apply(proposed, &mut ctx));
        }

        assert!(lock.is_some(), "expected drift detection to have created a mode lock");
        let last = last_result.expect("at least one cycle ran");
        assert_eq!(last.mode, lock.as_ref().unwrap().mode);
        assert_ne!(last.reason, Some(ClassificationReason::InsufficientEvidence));
    }

    #[test]
    fn majority_mode_requires_strict_majority() {
        let now = chrono::Utc::now();
        let c = Coord { lat: 0.0, lon: 0.0 };
        let samples = vec![
            DriftSample { mode: Mode::Inside, coord: c, confidence: 0.6, t: now },
            DriftSample { mode: Mode::Outside, coord: c, confidence: 0.6, t: now },
            DriftSample { mode: Mode::Inside, coord: c, confidence: 0.6, t: now },
        ];
        assert_eq!(majority_mode(&samples), Some(Mode::Inside));

        let tie = vec![
            DriftSample { mode: Mode::Inside, coord: c, confidence: 0.6, t: now },
            DriftSample { mode: Mode::Outside, coord: c, confidence: 0.6, t: now },
        ];
        assert_eq!(majority_mode(&tie), None);
    }
}
