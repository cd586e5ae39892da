//! MotionAnalyzer (C4) — folds recent motion samples into a `MotionState`,
//! owns vehicle-mode persistence and cyclist rejection.

use chrono::{DateTime, Duration, Utc};

use crate::config::MotionConfig;
use crate::types::{Activity, MotionSample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub is_stationary: bool,
    pub is_walking: bool,
    pub is_running: bool,
    pub is_vehicle: bool,
    pub just_started_moving: bool,
    pub activity: Option<Activity>,
    pub avg_speed: f64,
    pub vehicle_confidence: f64,
}

impl MotionState {
    fn idle() -> Self {
        Self {
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
}

/// Owns the vehicle-persistence timer across calls — spec.md §4.4 "Vehicle
/// persistence" requires state that survives a single firing losing its
/// rule match.
#[derive(Debug, Default)]
pub struct MotionAnalyzer {
    last_vehicle_detection: Option<DateTime<Utc>>,
    last_strong_confidence: f64,
    is_in_vehicle_mode: bool,
}

impl MotionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes the last 60 s of motion samples. `samples` must already be
    /// restricted to that window by the caller (the engine reads
    /// `ObservationHistory::recent_*`-style accessors).
    pub fn analyze(&mut self, samples: &[MotionSample], now: DateTime<Utc>, cfg: &MotionConfig) -> MotionState {
        if samples.is_empty() {
            return MotionState::idle();
        }

        let avg_speed = samples.iter().map(|s| s.speed_mps).sum::<f64>() / samples.len() as f64;
        let latest_activity = samples.last().map(|s| s.activity);

        let is_stationary = avg_speed < cfg.stationary_max_mps;
        let is_walking = (cfg.walking_min_mps..cfg.walking_max_mps).contains(&avg_speed);
        let is_running = (cfg.running_min_mps..cfg.running_max_mps).contains(&avg_speed);

        let just_started_moving = samples.len() >= 2
            && samples[samples.len() - 2].speed_mps < cfg.stationary_max_mps
            && avg_speed >= cfg.walking_min_mps;

        let rule_confidence = self.rule_vehicle_confidence(samples, avg_speed, cfg);
        let vehicle_confidence = self.apply_persistence(rule_confidence, avg_speed, now, cfg);

        MotionState {
            is_stationary,
            is_walking,
            is_running,
            is_vehicle: vehicle_confidence > cfg.vehicle_confidence_floor,
            just_started_moving,
            activity: latest_activity,
            avg_speed,
            vehicle_confidence,
        }
    }

    /// Highest-scoring rule from spec.md §4.4's table, after cyclist
    /// rejection.
    fn rule_vehicle_confidence(&self, samples: &[MotionSample], avg_speed: f64, cfg: &MotionConfig) -> f64 {
        if self.is_cyclist(samples, avg_speed) {
            return 0.0;
        }

        let automotive_count = samples.iter().filter(|s| s.activity == Activity::Automotive).count();
        let automotive_fraction = automotive_count as f64 / samples.len() as f64;
        let speeds: Vec<f64> = samples.iter().map(|s| s.speed_mps).collect();
        let peak = speeds.iter().cloned().fold(0.0_f64, f64::max);
        let min = speeds.iter().cloned().fold(f64::INFINITY, f64::min);
        let stdev = sample_std_dev(&speeds);

        let last_three_avg = tail_avg(&speeds, 3);
        let last_three_min = speeds.iter().rev().take(3).cloned().fold(f64::INFINITY, f64::min);

        let mut best = 0.0_f64;

        if automotive_fraction >= 0.5 {
            best = best.max(0.95);
        }
        if automotive_fraction > 0.0 && avg_speed > 3.0 {
            best = best.max(0.90);
        }
        if automotive_fraction > 0.0 && avg_speed <= 3.0 {
            best = best.max(0.85);
        }
        if samples.len() >= 3 && last_three_avg > 22.0 {
            best = best.max(0.98);
        }
        if samples.len() >= 3 && last_three_avg > 11.0 && last_three_min > 5.0 {
            best = best.max(0.92);
        }
        if avg_speed > 6.0 && peak > 8.0 {
            best = best.max(0.88);
        }
        if avg_speed > 4.0 && peak > 6.0 {
            best = best.max(0.82);
        }
        if automotive_fraction > 0.0
            && (0.3..4.0).contains(&avg_speed)
            && !(cfg.walking_min_mps..cfg.walking_max_mps).contains(&avg_speed)
        {
            best = best.max(0.78);
        }
        if stdev > 3.0 && avg_speed > 3.0 && peak > 8.0 {
            best = best.max(0.85);
        }

        let _ = min;
        best
    }

    /// spec.md §4.4 "Cyclist rejection": platform-reported cycling, a
    /// sustained >4 m/s run with low variance, or generally low speed
    /// variance with no automotive flag all zero out vehicle confidence.
    fn is_cyclist(&self, samples: &[MotionSample], avg_speed: f64) -> bool {
        let has_automotive = samples.iter().any(|s| s.activity == Activity::Automotive);
        if samples.iter().any(|s| s.activity == Activity::Cycling) {
            return true;
        }
        let speeds: Vec<f64> = samples.iter().map(|s| s.speed_mps).collect();
        let stdev = sample_std_dev(&speeds);
        if avg_speed > 4.0 && stdev < 1.2 && !has_automotive {
            return true;
        }
        if stdev < 1.5 && !has_automotive {
            return true;
        }
        false
    }

    /// spec.md §4.4 "Vehicle persistence" / "Parking exit".
    fn apply_persistence(&mut self, rule_confidence: f64, avg_speed: f64, now: DateTime<Utc>, cfg: &MotionConfig) -> f64 {
        if rule_confidence >= cfg.vehicle_confidence_floor {
            self.last_vehicle_detection = Some(now);
            self.last_strong_confidence = rule_confidence;
            self.is_in_vehicle_mode = true;
            return rule_confidence;
        }

        let Some(last) = self.last_vehicle_detection else {
            return rule_confidence;
        };
        let elapsed = now - last;

        if elapsed > Duration::seconds(cfg.parking_exit_seconds)
            && avg_speed < cfg.parking_exit_speed_mps
        {
            self.is_in_vehicle_mode = false;
            self.last_vehicle_detection = None;
            return rule_confidence;
        }

        if elapsed <= Duration::seconds(cfg.vehicle_persistence_seconds) && self.is_in_vehicle_mode {
            let decayed = self.last_strong_confidence - elapsed.num_seconds() as f64 / 600.0;
            return rule_confidence.max(cfg.vehicle_confidence_floor.max(decayed));
        }

        rule_confidence
    }
}

fn tail_avg(values: &[f64], n: usize) -> f64 {
    let tail: Vec<f64> = values.iter().rev().take(n).cloned().collect();
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MotionConfig {
        MotionConfig::default()
    }

    fn sample(speed: f64, activity: Activity, secs_ago: i64) -> MotionSample {
        MotionSample {
            speed_mps: speed,
            activity,
            t: Utc::now() - Duration::seconds(secs_ago),
        }
    }

    #[test]
    fn cyclist_never_produces_vehicle() {
        let mut analyzer = MotionAnalyzer::new();
        let samples: Vec<_> = (0..6)
            .map(|i| sample(6.0, Activity::Cycling, 60 - i * 10))
            .collect();
        let state = analyzer.analyze(&samples, Utc::now(), &cfg());
        assert_eq!(state.vehicle_confidence, 0.0);
        assert!(!state.is_vehicle);
    }

    #[test]
    fn automotive_majority_yields_high_confidence() {
        let mut analyzer = MotionAnalyzer::new();
        let samples: Vec<_> = (0..6)
            .map(|i| sample(12.0, Activity::Automotive, 60 - i * 10))
            .collect();
        let state = analyzer.analyze(&samples, Utc::now(), &cfg());
        assert!(state.vehicle_confidence >= 0.95);
        assert!(state.is_vehicle);
    }

    #[test]
    fn vehicle_persists_through_a_stop() {
        let mut analyzer = MotionAnalyzer::new();
        let now = Utc::now();
        let moving: Vec<_> = (0..6).map(|i| sample(12.0, Activity::Automotive, 60 - i * 10)).collect();
        let first = analyzer.analyze(&moving, now, &cfg());
        assert!(first.is_vehicle);

        let stopped: Vec<_> = (0..6).map(|i| sample(0.2, Activity::Unknown, 60 - i * 10)).collect();
        let later = now + Duration::seconds(120);
        let second = analyzer.analyze(&stopped, later, &cfg());
        assert!(second.vehicle_confidence >= cfg().vehicle_confidence_floor, "{:?}", second);
    }

    #[test]
    fn parking_exit_clears_persistence_after_timeout() {
        let mut analyzer = MotionAnalyzer::new();
        let now = Utc::now();
        let moving: Vec<_> = (0..6).map(|i| sample(12.0, Activity::Automotive, 60 - i * 10)).collect();
        analyzer.analyze(&moving, now, &cfg());

        let stopped: Vec<_> = (0..6).map(|i| sample(0.1, Activity::Unknown, 60 - i * 10)).collect();
        let much_later = now + Duration::seconds(400);
        let state = analyzer.analyze(&stopped, much_later, &cfg());
        assert!(!state.is_vehicle);
    }
}
