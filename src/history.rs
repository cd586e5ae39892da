//! ObservationHistory (C3) — time-windowed ring buffers and the derived
//! queries every tier reads from.
//!
//! All buffers are append-only-with-prune: callers append through
//! [`ObservationHistory::record_*`] and the engine prunes by age/count
//! after each cycle (spec.md §3 "Lifecycles").

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::geometry::haversine_distance;
use crate::types::{
    AccuracySample, Activity, Coord, DriftSample, HistoryEntry, Mode, MotionSample,
    PolygonEntryRecord, PolygonExitRecord, PressureSample,
};

/// Minimum haversine distance between entry and exit coordinate for a
/// polygon exit to be recorded — invariant §3.4.
const MIN_EXIT_DISTANCE_M: f64 = 10.0;

/// Sample standard deviation (Bessel-corrected), 0.0 below two samples.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[derive(Debug, Default)]
pub struct ObservationHistory {
    motion: VecDeque<MotionSample>,
    accuracy: VecDeque<AccuracySample>,
    pressure: VecDeque<PressureSample>,
    location_history: VecDeque<HistoryEntry>,
    drift: VecDeque<DriftSample>,
    polygon_entries: VecDeque<PolygonEntryRecord>,
    polygon_exits: VecDeque<PolygonExitRecord>,
    /// Currently-inside polygon IDs, refreshed every cycle against the
    /// latest footprint fetch (invariant §3.5).
    currently_inside: Vec<String>,
    last_floor_time: Option<DateTime<Utc>>,
}

impl ObservationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- recording -------------------------------------------------

    pub fn record_motion(&mut self, sample: MotionSample, cfg: &crate::config::HistoryConfig) {
        self.motion.push_back(sample);
        self.prune_motion(sample.t, cfg);
    }

    pub fn record_accuracy(&mut self, sample: AccuracySample, cfg: &crate::config::HistoryConfig) {
        self.accuracy.push_back(sample);
        while self.accuracy.len() > cfg.accuracy_max_samples {
            self.accuracy.pop_front();
        }
    }

    pub fn record_pressure(&mut self, sample: PressureSample, cfg: &crate::config::HistoryConfig) {
        self.pressure.push_back(sample);
        while self.pressure.len() > cfg.pressure_max_samples {
            self.pressure.pop_front();
        }
    }

    /// Appends a location-history entry. Per invariant §3.3, `mode ==
    /// unknown` entries are never voted on and are rejected here rather
    /// than filtered downstream.
    pub fn record_location_history(&mut self, entry: HistoryEntry, cfg: &crate::config::HistoryConfig) {
        if entry.mode == Mode::Unknown {
            return;
        }
        self.location_history.push_back(entry.clone());
        self.prune_location_history(entry.t, cfg);
    }

    pub fn record_drift(&mut self, sample: DriftSample, window: Duration) {
        self.drift.push_back(sample);
        let cutoff = sample.t - window;
        while self.drift.front().is_some_and(|s| s.t < cutoff) {
            self.drift.pop_front();
        }
    }

    pub fn record_floor(&mut self, t: DateTime<Utc>) {
        self.last_floor_time = Some(t);
    }

    fn prune_motion(&mut self, now: DateTime<Utc>, cfg: &crate::config::HistoryConfig) {
        let cutoff = now - Duration::seconds(cfg.motion_window_seconds);
        while self.motion.front().is_some_and(|s| s.t < cutoff) {
            self.motion.pop_front();
        }
        while self.motion.len() > cfg.motion_max_samples {
            self.motion.pop_front();
        }
    }

    fn prune_location_history(&mut self, now: DateTime<Utc>, cfg: &crate::config::HistoryConfig) {
        let cutoff = now - Duration::seconds(cfg.location_history_window_seconds);
        while self.location_history.front().is_some_and(|e| e.t < cutoff) {
            self.location_history.pop_front();
        }
        while self.location_history.len() > cfg.location_history_max_entries {
            self.location_history.pop_front();
        }
    }

    /// Removes outdoor entries with confidence below `max_confidence` from
    /// the last `window` of location history. Used by the polygon-entry
    /// immediate-override path (spec.md §4.6 stable-mode vote, S3).
    pub fn purge_recent_weak_outdoor(&mut self, now: DateTime<Utc>, window: Duration, max_confidence: f64) {
        let cutoff = now - window;
        self.location_history
            .retain(|e| !(e.t >= cutoff && e.mode == Mode::Outside && e.confidence < max_confidence));
    }

    // ---- polygon occupancy (§4.3, §3.5) -----------------------------

    /// Refreshes `currently_inside` to the subset of `footprint_ids` whose
    /// polygon actually contains `coord` — invariant §3.5 keeps this a
    /// subset of the latest fetch regardless of stale entry/exit records.
    pub fn update_polygon_occupancy(&mut self, inside_now: Vec<String>) {
        self.currently_inside = inside_now;
    }

    pub fn inside_any_polygon(&self) -> bool {
        !self.currently_inside.is_empty()
    }

    pub fn currently_inside_ids(&self) -> &[String] {
        &self.currently_inside
    }

    pub fn polygon_entry(&mut self, building_id: String, t: DateTime<Utc>, entry_coord: Coord) {
        if self.polygon_entries.iter().any(|e| e.building_id == building_id) {
            return;
        }
        self.polygon_entries.push_back(PolygonEntryRecord {
            building_id,
            entered_at: t,
            entry_coord,
        });
    }

    /// Records an exit, rejecting it per invariant §3.4 if the user hasn't
    /// actually moved away from where they entered.
    pub fn polygon_exit(&mut self, building_id: &str, t: DateTime<Utc>, current_coord: Coord) -> bool {
        let Some(pos) = self.polygon_entries.iter().position(|e| e.building_id == building_id) else {
            return false;
        };
        let entry = self.polygon_entries[pos].entry_coord;
        if haversine_distance(entry, current_coord) < MIN_EXIT_DISTANCE_M {
            return false;
        }
        self.polygon_entries.remove(pos);
        self.polygon_exits.push_back(PolygonExitRecord {
            building_id: building_id.to_string(),
            exited_at: t,
        });
        while self.polygon_exits.len() > 32 {
            self.polygon_exits.pop_front();
        }
        true
    }

    pub fn polygon_sustained(&self, now: DateTime<Utc>, min_duration: Duration) -> bool {
        self.inside_any_polygon()
            && self
                .polygon_entries
                .iter()
                .any(|e| now - e.entered_at >= min_duration)
    }

    pub fn recent_polygon_exit(&self, now: DateTime<Utc>, within: Duration) -> bool {
        self.polygon_exits.iter().any(|e| now - e.exited_at <= within)
    }

    // ---- floor (§4.3, §4.5 Tier 1) ----------------------------------

    pub fn floor_detection_recent(&self, now: DateTime<Utc>, within: Duration) -> bool {
        self.last_floor_time.is_some_and(|t| now - t <= within)
    }

    pub fn last_floor_time(&self) -> Option<DateTime<Utc>> {
        self.last_floor_time
    }

    // ---- derived queries (§4.3) --------------------------------------

    pub fn recent_accuracy_samples(&self, now: DateTime<Utc>, window: Duration) -> Vec<AccuracySample> {
        let cutoff = now - window;
        self.accuracy.iter().filter(|s| s.t >= cutoff).copied().collect()
    }

    pub fn last_n_accuracy(&self, n: usize) -> Vec<AccuracySample> {
        self.accuracy.iter().rev().take(n).copied().collect()
    }

    /// `stable ⇔ σ < 5 m` over the last 60 s of accuracy samples.
    pub fn gps_stability(&self, now: DateTime<Utc>) -> (bool, f64) {
        let samples = self.recent_accuracy_samples(now, Duration::seconds(60));
        if samples.len() < 2 {
            return (false, f64::NAN);
        }
        let values: Vec<f64> = samples.iter().map(|s| s.accuracy_m).collect();
        let stdev = sample_std_dev(&values);
        (stdev.is_finite() && stdev < 5.0, stdev)
    }

    pub fn sustained_good_accuracy(&self, now: DateTime<Utc>) -> bool {
        let samples = self.recent_accuracy_samples(now, Duration::seconds(60));
        samples.len() >= 4 && samples.iter().all(|s| s.accuracy_m < 25.0)
    }

    /// Returns `(sustained, avg_accuracy, duration)` for the last 60 s if
    /// every sample in that window has accuracy < 12 m.
    pub fn sustained_excellent_gps(&self, now: DateTime<Utc>) -> (bool, f64, Duration) {
        let samples = self.recent_accuracy_samples(now, Duration::seconds(60));
        if samples.len() < 4 || !samples.iter().all(|s| s.accuracy_m < 12.0) {
            return (false, f64::NAN, Duration::zero());
        }
        let avg = samples.iter().map(|s| s.accuracy_m).sum::<f64>() / samples.len() as f64;
        let duration = samples.last().map(|s| s.t).unwrap_or(now) - samples.first().map(|s| s.t).unwrap_or(now);
        (true, avg, duration)
    }

    /// Walks backward from the most recent motion sample while the
    /// activity stays within `activities`, returning how long that streak
    /// has lasted.
    pub fn consecutive_activity_duration(&self, now: DateTime<Utc>, activities: &[Activity]) -> Duration {
        let mut streak_start: Option<DateTime<Utc>> = None;
        for sample in self.motion.iter().rev() {
            if activities.contains(&sample.activity) {
                streak_start = Some(sample.t);
            } else {
                break;
            }
        }
        streak_start.map(|start| now - start).unwrap_or_else(Duration::zero)
    }

    /// Scans location history backward; returns `(mode, count, avg_confidence)`
    /// for the current streak of identical modes.
    pub fn consecutive_mode_streak(&self) -> Option<(Mode, usize, f64)> {
        let mut iter = self.location_history.iter().rev();
        let first = iter.next()?;
        let mode = first.mode;
        let mut count = 1;
        let mut sum = first.confidence;
        for entry in iter {
            if entry.mode != mode {
                break;
            }
            count += 1;
            sum += entry.confidence;
        }
        Some((mode, count, sum / count as f64))
    }

    pub fn recent_location_history(&self, now: DateTime<Utc>, window: Duration) -> Vec<HistoryEntry> {
        let cutoff = now - window;
        self.location_history
            .iter()
            .filter(|e| e.t >= cutoff)
            .cloned()
            .collect()
    }

    pub fn location_history_is_empty(&self) -> bool {
        self.location_history.is_empty()
    }

    pub fn recent_pressure_samples(&self, now: DateTime<Utc>, window: Duration) -> Vec<PressureSample> {
        let cutoff = now - window;
        self.pressure.iter().filter(|s| s.t >= cutoff).copied().collect()
    }

    pub fn no_indoor_history_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let cutoff = now - window;
        !self
            .location_history
            .iter()
            .any(|e| e.t >= cutoff && e.mode == Mode::Inside)
    }

    pub fn last_n_motion(&self, n: usize) -> Vec<MotionSample> {
        self.motion.iter().rev().take(n).copied().collect()
    }

    pub fn motion_window(&self) -> &VecDeque<MotionSample> {
        &self.motion
    }

    pub fn recent_drift_samples(&self, now: DateTime<Utc>, window: Duration) -> Vec<DriftSample> {
        let cutoff = now - window;
        self.drift.iter().filter(|s| s.t >= cutoff).copied().collect()
    }

    pub fn no_accuracy_sample_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let cutoff = now - window;
        !self
            .accuracy
            .iter()
            .any(|s| s.t >= cutoff && s.accuracy_m > 0.0 && s.accuracy_m < 150.0)
    }

    pub fn latest_pressure_sample(&self) -> Option<PressureSample> {
        self.pressure.back().copied()
    }

    /// `newest − oldest` pressure reading within `window`, in hPa. `None`
    /// if fewer than two samples fall inside the window.
    pub fn pressure_delta(&self, now: DateTime<Utc>, window: Duration) -> Option<f64> {
        let samples = self.recent_pressure_samples(now, window);
        let first = samples.first()?;
        let last = samples.last()?;
        (samples.len() >= 2).then(|| last.pressure_hpa - first.pressure_hpa)
    }

    /// Last `n` accuracy samples in chronological (oldest-first) order.
    pub fn last_n_accuracy_chronological(&self, n: usize) -> Vec<AccuracySample> {
        let mut v = self.last_n_accuracy(n);
        v.reverse();
        v
    }
}
