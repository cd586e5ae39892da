//! DetectionEngine (C7) — the per-fix cycle that ties every other module
//! together: stale-fix rejection, tunnel handling, manual override,
//! footprint lookup, tier classification, post-processing, and publication.
//! Grounded on `pipeline::processor::VibrationProcessor`'s struct-owns-state
//! + `process_reading` cycle method, and on `pipeline::coordinator`'s
//! channel-based publication of the latest reading.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DetectionConfig;
use crate::footprint_cache::FootprintCache;
use crate::geometry::{nearest_polygon_distance, point_in_polygon};
use crate::history::ObservationHistory;
use crate::motion::MotionAnalyzer;
use crate::postprocess::{self, PostProcessContext};
use crate::storage::EngineStorage;
use crate::tiers::{self, TierContext};
use crate::types::{
    AccuracySample, Activity, ClassificationReason, ClassificationResult, Coord, DetectionState, Fix, HistoryEntry,
    ManualOverride, Mode, ModeLock, ModeTransition, MotionSample, PressureSample, SignalSource,
};

const TRANSITION_CHANNEL_CAPACITY: usize = 32;

/// Whether the engine is currently suppressing the tier pipeline because it
/// believes the device has entered a tunnel (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TunnelState {
    Normal,
    InTunnel {
        entered_at: DateTime<Utc>,
        pre_tunnel_mode: Mode,
    },
}

/// Outbound platform commands a cycle may want issued, surfaced to the
/// caller instead of held as a direct platform handle (spec.md §9
/// "message passing" — the engine owns state, the platform adapter owns
/// the channels).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub state: DetectionState,
    pub set_distance_filter_m: Option<f64>,
    pub request_immediate_update: bool,
}

/// A geofence the engine wants the platform to arm for wakeup purposes
/// only (spec.md §6 — entry/exit never decide a mode by themselves).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRequest {
    pub centre: Coord,
    pub radius_m: f64,
}

/// Orchestrates the classification pipeline across a stream of fixes.
/// Owns all mutable pipeline state; collaborators (`FootprintCache`,
/// `EngineStorage`) are injected so the whole thing is unit-testable
/// without a live map service or disk.
pub struct DetectionEngine {
    clock: Arc<dyn Clock>,
    cfg: DetectionConfig,
    footprint_cache: FootprintCache,
    storage: Option<EngineStorage>,
    history: ObservationHistory,
    motion_analyzer: MotionAnalyzer,
    mode_lock: Option<ModeLock>,
    manual_override: Option<ManualOverride>,
    tunnel: TunnelState,
    last_fix_time: Option<DateTime<Utc>>,
    last_published: Option<DetectionState>,
    state_tx: watch::Sender<Option<DetectionState>>,
    transition_tx: broadcast::Sender<ModeTransition>,
}

impl DetectionEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        cfg: DetectionConfig,
        footprint_cache: FootprintCache,
        storage: Option<EngineStorage>,
    ) -> Self {
        let restored = storage.as_ref().and_then(|s| {
            s.load_last_state(clock.now(), Duration::seconds(cfg.engine.restored_state_max_age_seconds))
                .ok()
                .flatten()
        }).map(|s| DetectionState { is_stale: true, ..s });
        let manual_override = storage.as_ref().and_then(|s| s.load_manual_override().ok().flatten());

        let (state_tx, _) = watch::channel(restored);
        let (transition_tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Self {
            clock,
            cfg,
            footprint_cache,
            storage,
            history: ObservationHistory::new(),
            motion_analyzer: MotionAnalyzer::new(),
            mode_lock: None,
            manual_override,
            tunnel: TunnelState::Normal,
            last_fix_time: None,
            last_published: restored,
            state_tx,
            transition_tx,
        }
    }

    /// Subscribes to the latest published `DetectionState`. Mirrors
    /// `pipeline::coordinator`'s `watch::Receiver<Option<Reading>>` handle.
    pub fn subscribe_state(&self) -> watch::Receiver<Option<DetectionState>> {
        self.state_tx.subscribe()
    }

    /// Subscribes to mode-change events, independent of the latest-value
    /// state channel — a transition is a discrete event, not a value a late
    /// subscriber should catch up on.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ModeTransition> {
        self.transition_tx.subscribe()
    }

    pub fn latest_state(&self) -> Option<DetectionState> {
        self.last_published
    }

    /// Arms a manual override: the next `duration` worth of cycles publish
    /// `inside` at full confidence unconditionally (spec.md §4.1 Tier 0).
    pub fn set_manual_override(&mut self, duration: Duration) {
        let over = ManualOverride { started_at: self.clock.now(), duration };
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_manual_override(&over) {
                warn!(error = %e, "failed to persist manual override");
            }
        }
        self.manual_override = Some(over);
    }

    pub fn clear_manual_override(&mut self) {
        self.manual_override = None;
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.clear_manual_override() {
                warn!(error = %e, "failed to clear persisted manual override");
            }
        }
    }

    /// Runs one classification cycle for `fix`. Returns `None` if the fix
    /// was dropped as stale.
    pub async fn process_fix(&mut self, fix: Fix) -> Option<CycleOutcome> {
        let now = fix.t;

        if let Some(last) = self.last_fix_time {
            if now < last && last - now > Duration::seconds(self.cfg.engine.stale_fix_seconds) {
                debug!(?now, ?last, "dropping stale fix");
                return None;
            }
        }
        self.last_fix_time = Some(now);

        self.history.record_motion(
            MotionSample { speed_mps: fix.speed_mps.unwrap_or(0.0), activity: Activity::Unknown, t: now },
            &self.cfg.history,
        );
        self.history.record_accuracy(
            AccuracySample { accuracy_m: fix.accuracy_m, coord: Coord { lat: fix.lat, lon: fix.lon }, t: now },
            &self.cfg.history,
        );
        if fix.floor_level.is_some() {
            self.history.record_floor(now);
        }

        let motion = self.motion_analyzer.analyze(self.history.motion_window().make_contiguous(), now, &self.cfg.motion);

        self.update_tunnel_state(&fix, &motion, now);
        if let TunnelState::InTunnel { pre_tunnel_mode, .. } = self.tunnel {
            let result = ClassificationResult::new(pre_tunnel_mode, self.cfg.tunnel.confidence, SignalSource::Tunnel);
            self.record_history_entry(&fix, &result);
            return Some(self.publish(fix, result, &motion));
        }

        if let Some(result) = tiers::manual_override::evaluate(self.manual_override.as_ref(), now) {
            self.record_history_entry(&fix, &result);
            return Some(self.publish(fix, result, &motion));
        }
        if self.manual_override.is_some() {
            self.manual_override = None;
        }

        let coord = Coord { lat: fix.lat, lon: fix.lon };
        let (footprints, fetch_failed) = self.footprint_cache.lookup(coord).await;
        let nearest_distance = nearest_polygon_distance(coord, &footprints);
        let inside_ids: Vec<String> =
            footprints.iter().filter(|f| point_in_polygon(coord, &f.polygon)).map(|f| f.id.clone()).collect();
        let inside_polygon = !inside_ids.is_empty();
        self.update_polygon_occupancy(&inside_ids, coord, now);

        let tier_ctx = TierContext {
            fix,
            history: &self.history,
            motion: &motion,
            footprints: &footprints,
            nearest_distance,
            inside_polygon,
            footprint_fetch_failed: fetch_failed,
            cfg: &self.cfg.tiers,
        };
        let proposed = tiers::classify(&tier_ctx);

        let mut pp_ctx = PostProcessContext {
            fix,
            motion: &motion,
            history: &mut self.history,
            mode_lock: &mut self.mode_lock,
            nearest_distance,
            cfg: &self.cfg.postprocess,
            mode_lock_cfg: &self.cfg.mode_lock,
            drift_cfg: &self.cfg.drift,
            history_cfg: &self.cfg.history,
        };
        let result = postprocess::apply(proposed, &mut pp_ctx);

        Some(self.publish(fix, result, &motion))
    }

    pub async fn process_pressure(&mut self, sample: PressureSample) {
        self.history.record_pressure(sample, &self.cfg.history);
    }

    pub async fn process_motion_update(&mut self, activity: Activity, speed_mps: f64, t: DateTime<Utc>) {
        self.history.record_motion(MotionSample { speed_mps, activity, t }, &self.cfg.history);
    }

    fn update_polygon_occupancy(&mut self, inside_now: &[String], coord: Coord, now: DateTime<Utc>) {
        let previously_inside = self.history.currently_inside_ids().to_vec();
        for id in inside_now {
            if !previously_inside.contains(id) {
                self.history.polygon_entry(id.clone(), now, coord);
            }
        }
        for id in &previously_inside {
            if !inside_now.contains(id) {
                self.history.polygon_exit(id, now, coord);
            }
        }
        self.history.update_polygon_occupancy(inside_now.to_vec());
    }

    fn update_tunnel_state(&mut self, fix: &Fix, motion: &crate::motion::MotionState, now: DateTime<Utc>) {
        let cfg = &self.cfg.tunnel;
        match self.tunnel {
            TunnelState::Normal => {
                let pre_tunnel_mode = self.last_published.map(|s| s.mode).unwrap_or(Mode::Unknown);
                let recent = self.history.last_n_accuracy_chronological(3);
                let recent_avg = if recent.is_empty() {
                    0.0
                } else {
                    recent.iter().map(|s| s.accuracy_m).sum::<f64>() / recent.len() as f64
                };
                if pre_tunnel_mode == Mode::Vehicle
                    && recent_avg < cfg.enter_recent_accuracy_m
                    && fix.accuracy_m > cfg.enter_current_accuracy_m
                    && motion.avg_speed > cfg.enter_speed_mps
                {
                    info!("entering tunnel state");
                    self.tunnel = TunnelState::InTunnel { entered_at: now, pre_tunnel_mode };
                }
            }
            TunnelState::InTunnel { entered_at, .. } => {
                let recent = self.history.last_n_accuracy_chronological(3);
                let all_recent_good = recent.len() == 3 && recent.iter().all(|s| s.accuracy_m < cfg.exit_accuracy_m);
                let forced_exit = now - entered_at > Duration::seconds(cfg.exit_timeout_seconds);
                if (fix.accuracy_m < cfg.exit_accuracy_m && all_recent_good) || forced_exit {
                    info!(forced_exit, "exiting tunnel state");
                    self.tunnel = TunnelState::Normal;
                }
            }
        }
    }

    /// Records one location-history entry for a fix the main tier+postprocess
    /// path never touches — the tunnel and manual-override short-circuits,
    /// which publish directly without running [`postprocess::apply`] (and so
    /// miss its own §4.6 step-7 append). The normal path must *not* call this:
    /// `postprocess::apply` already records the entry once.
    fn record_history_entry(&mut self, fix: &Fix, result: &ClassificationResult) {
        if result.mode == Mode::Unknown {
            return;
        }
        self.history.record_location_history(
            HistoryEntry {
                mode: result.mode,
                confidence: result.confidence,
                coord: Coord { lat: fix.lat, lon: fix.lon },
                accuracy: Some(fix.accuracy_m),
                source: result.source,
                reason: result.reason,
                t: fix.t,
            },
            &self.cfg.history,
        );
    }

    fn publish(&mut self, fix: Fix, result: ClassificationResult, motion: &crate::motion::MotionState) -> CycleOutcome {
        let now = fix.t;
        let from_mode = self.last_published.map(|s| s.mode);

        let state = DetectionState {
            coord: Coord { lat: fix.lat, lon: fix.lon },
            mode: result.mode,
            confidence: result.confidence,
            t: now,
            is_stale: false,
            speed_mps: fix.speed_mps,
            accuracy_m: Some(fix.accuracy_m),
            activity: motion.activity,
            reason: result.reason,
        };

        if let Some(from) = from_mode {
            if from != result.mode {
                let duration_in_from = self
                    .last_published
                    .map(|s| now - s.t)
                    .filter(|_| true);
                let _ = self.transition_tx.send(ModeTransition {
                    from,
                    to: result.mode,
                    confidence: result.confidence,
                    trigger: result.source,
                    duration_in_from,
                });
            }
        }

        self.last_published = Some(state);
        let _ = self.state_tx.send(Some(state));

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_last_state(&state) {
                warn!(error = %e, "failed to persist detection state");
            }
            if result.mode != Mode::Unknown {
                if let Err(e) = storage.append_location_history(&HistoryEntry {
                    mode: result.mode,
                    confidence: result.confidence,
                    coord: state.coord,
                    accuracy: Some(fix.accuracy_m),
                    source: result.source,
                    reason: result.reason,
                    t: now,
                }) {
                    warn!(error = %e, "failed to append location history");
                }
            }
        }

        self.build_outcome(state, motion)
    }

    /// spec.md §4.7 "Adaptive observation rate": tighten the distance
    /// filter while moving or uncertain, relax it while stationary and
    /// confident, and request an immediate follow-up fix for a short window
    /// after a polygon/geofence exit.
    fn build_outcome(&self, state: DetectionState, motion: &crate::motion::MotionState) -> CycleOutcome {
        let cfg = &self.cfg.engine;
        let filter = if motion.avg_speed > 2.0 || state.confidence < 0.70 {
            Some(cfg.tight_distance_filter_m)
        } else if motion.is_stationary && state.confidence >= 0.85 {
            Some(cfg.relaxed_distance_filter_m)
        } else {
            None
        };

        let recent_exit = self
            .history
            .recent_polygon_exit(state.t, Duration::seconds(cfg.post_exit_immediate_update_seconds));

        CycleOutcome { state, set_distance_filter_m: filter, request_immediate_update: recent_exit }
    }

    /// TTL a caller should treat a published state as fresh for (spec.md
    /// §4.7 "Adaptive TTL").
    pub fn state_ttl(&self, state: &DetectionState, motion: &crate::motion::MotionState) -> Duration {
        let cfg = &self.cfg.engine;
        if motion.avg_speed > 2.0 {
            Duration::seconds(cfg.ttl_moving_seconds)
        } else if motion.is_stationary && state.confidence > 0.8 {
            Duration::seconds(cfg.ttl_stationary_confident_seconds)
        } else {
            Duration::seconds(cfg.ttl_default_seconds)
        }
    }
}
