//! Detection configuration — every operator-tunable threshold named in
//! SPEC_FULL.md §A.3, as TOML values with defaults matching spec.md's
//! literal constants.
//!
//! Fine-grained per-band numbers inside a single classification table (e.g.
//! the accuracy-pattern avg/stdev bands of Tier 2) are kept as code
//! constants rather than config fields — they form one reviewed rule table
//! per spec.md §9 ("adding one requires code-level review"), not a set of
//! independently tunable knobs. What *is* here: cache/TTL/window sizing,
//! mode-lock and drift timing, motion speed bands, and vote weighting —
//! the knobs a deployment would plausibly retune without a code change.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tracks which configuration keys were explicitly present in the
/// operator's TOML file, as opposed to filled in from `#[serde(default)]`.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    pub explicit_keys: HashSet<String>,
}

impl ConfigProvenance {
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub footprint_cache: FootprintCacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
    #[serde(default)]
    pub mode_lock: ModeLockConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            footprint_cache: FootprintCacheConfig::default(),
            history: HistoryConfig::default(),
            motion: MotionConfig::default(),
            tiers: TiersConfig::default(),
            postprocess: PostProcessConfig::default(),
            mode_lock: ModeLockConfig::default(),
            drift: DriftConfig::default(),
            tunnel: TunnelConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Load configuration using the standard search order:
    /// 1. `$CONTEXT_ENGINE_CONFIG` environment variable
    /// 2. `./detection_config.toml` in the current working directory
    /// 3. Built-in defaults (matching spec.md's literal constants)
    pub fn load() -> Self {
        let (config, _provenance) = Self::load_with_provenance();
        config
    }

    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        if let Ok(path) = std::env::var("CONTEXT_ENGINE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok((config, provenance)) => {
                        info!(path = %p.display(), "loaded detection config from CONTEXT_ENGINE_CONFIG");
                        return (config, provenance);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "failed to load config from CONTEXT_ENGINE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "CONTEXT_ENGINE_CONFIG points to a non-existent file, falling back");
            }
        }

        let local = PathBuf::from("detection_config.toml");
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok((config, provenance)) => {
                    info!("loaded detection config from ./detection_config.toml");
                    return (config, provenance);
                }
                Err(e) => {
                    warn!(error = %e, "failed to load ./detection_config.toml, using defaults");
                }
            }
        }

        info!("no detection_config.toml found — using built-in defaults");
        (Self::default(), ConfigProvenance::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    pub fn load_from_file_with_provenance(
        path: &Path,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let provenance = ConfigProvenance {
            explicit_keys: super::validation::walk_toml_keys(
                &contents
                    .parse::<toml::Value>()
                    .unwrap_or(toml::Value::Table(Default::default())),
                "",
            )
            .into_iter()
            .collect(),
        };

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok((config, provenance))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks internal consistency. Collects every violation before
    /// returning, the same way the rest of the config validates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !(0.0..1.0).contains(&self.postprocess.context_threshold_floor) {
            errors.push(format!(
                "postprocess.context_threshold_floor ({:.2}) must be in [0, 1)",
                self.postprocess.context_threshold_floor
            ));
        }
        if self.postprocess.context_threshold_vehicle <= self.postprocess.context_threshold_floor
        {
            errors.push(
                "postprocess.context_threshold_vehicle must exceed context_threshold_floor"
                    .to_string(),
            );
        }
        if self.footprint_cache.ttl_seconds == 0 {
            errors.push("footprint_cache.ttl_seconds must be > 0".to_string());
        }
        if self.footprint_cache.cell_precision_factor <= 0.0 {
            errors.push("footprint_cache.cell_precision_factor must be > 0".to_string());
        }
        if self.motion.walking_min_mps >= self.motion.walking_max_mps {
            errors.push("motion.walking_min_mps must be < motion.walking_max_mps".to_string());
        }
        if self.motion.running_min_mps >= self.motion.running_max_mps {
            errors.push("motion.running_min_mps must be < motion.running_max_mps".to_string());
        }
        if self.mode_lock.max_duration_seconds == 0 {
            errors.push("mode_lock.max_duration_seconds must be > 0".to_string());
        }
        if self.mode_lock.break_confidence <= self.mode_lock.create_confidence_floor {
            errors.push(
                "mode_lock.break_confidence must exceed mode_lock.create_confidence_floor"
                    .to_string(),
            );
        }
        if self.tunnel.exit_timeout_seconds == 0 {
            errors.push("tunnel.exit_timeout_seconds must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "config serialization error: {e}"),
            ConfigError::Validation(errors) => {
                writeln!(f, "detection config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootprintCacheConfig {
    /// Multiplier used when rounding lat/lon into grid cells (1e3 ≈ 111 m).
    #[serde(default = "default_cell_precision_factor")]
    pub cell_precision_factor: f64,
    #[serde(default = "default_query_radius_m")]
    pub query_radius_m: f64,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
    #[serde(default = "default_negative_cache_seconds")]
    pub negative_cache_seconds: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: i64,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

fn default_cell_precision_factor() -> f64 {
    1_000.0
}
fn default_query_radius_m() -> f64 {
    150.0
}
fn default_ttl_seconds() -> i64 {
    3_600
}
fn default_negative_cache_seconds() -> i64 {
    300
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> i64 {
    1_500
}
fn default_fetch_timeout_seconds() -> u64 {
    25
}

impl Default for FootprintCacheConfig {
    fn default() -> Self {
        Self {
            cell_precision_factor: default_cell_precision_factor(),
            query_radius_m: default_query_radius_m(),
            ttl_seconds: default_ttl_seconds(),
            negative_cache_seconds: default_negative_cache_seconds(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_motion_window_seconds")]
    pub motion_window_seconds: i64,
    #[serde(default = "default_motion_max_samples")]
    pub motion_max_samples: usize,
    #[serde(default = "default_accuracy_max_samples")]
    pub accuracy_max_samples: usize,
    #[serde(default = "default_location_history_window_seconds")]
    pub location_history_window_seconds: i64,
    #[serde(default = "default_location_history_max_entries")]
    pub location_history_max_entries: usize,
    #[serde(default = "default_drift_window_seconds")]
    pub drift_window_seconds: i64,
    #[serde(default = "default_pressure_max_samples")]
    pub pressure_max_samples: usize,
}

fn default_motion_window_seconds() -> i64 {
    600
}
fn default_motion_max_samples() -> usize {
    50
}
fn default_accuracy_max_samples() -> usize {
    30
}
fn default_location_history_window_seconds() -> i64 {
    300
}
fn default_location_history_max_entries() -> usize {
    20
}
fn default_drift_window_seconds() -> i64 {
    300
}
fn default_pressure_max_samples() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            motion_window_seconds: default_motion_window_seconds(),
            motion_max_samples: default_motion_max_samples(),
            accuracy_max_samples: default_accuracy_max_samples(),
            location_history_window_seconds: default_location_history_window_seconds(),
            location_history_max_entries: default_location_history_max_entries(),
            drift_window_seconds: default_drift_window_seconds(),
            pressure_max_samples: default_pressure_max_samples(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    #[serde(default = "default_stationary_max_mps")]
    pub stationary_max_mps: f64,
    #[serde(default = "default_walking_min_mps")]
    pub walking_min_mps: f64,
    #[serde(default = "default_walking_max_mps")]
    pub walking_max_mps: f64,
    #[serde(default = "default_running_min_mps")]
    pub running_min_mps: f64,
    #[serde(default = "default_running_max_mps")]
    pub running_max_mps: f64,
    #[serde(default = "default_vehicle_min_mps")]
    pub vehicle_min_mps: f64,
    #[serde(default = "default_vehicle_persistence_seconds")]
    pub vehicle_persistence_seconds: i64,
    #[serde(default = "default_parking_exit_seconds")]
    pub parking_exit_seconds: i64,
    #[serde(default = "default_parking_exit_speed_mps")]
    pub parking_exit_speed_mps: f64,
    #[serde(default = "default_vehicle_confidence_floor")]
    pub vehicle_confidence_floor: f64,
}

fn default_stationary_max_mps() -> f64 {
    0.8
}
fn default_walking_min_mps() -> f64 {
    0.5
}
fn default_walking_max_mps() -> f64 {
    2.0
}
fn default_running_min_mps() -> f64 {
    2.0
}
fn default_running_max_mps() -> f64 {
    5.0
}
fn default_vehicle_min_mps() -> f64 {
    5.0
}
fn default_vehicle_persistence_seconds() -> i64 {
    300
}
fn default_parking_exit_seconds() -> i64 {
    300
}
fn default_parking_exit_speed_mps() -> f64 {
    0.5
}
fn default_vehicle_confidence_floor() -> f64 {
    0.85
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stationary_max_mps: default_stationary_max_mps(),
            walking_min_mps: default_walking_min_mps(),
            walking_max_mps: default_walking_max_mps(),
            running_min_mps: default_running_min_mps(),
            running_max_mps: default_running_max_mps(),
            vehicle_min_mps: default_vehicle_min_mps(),
            vehicle_persistence_seconds: default_vehicle_persistence_seconds(),
            parking_exit_seconds: default_parking_exit_seconds(),
            parking_exit_speed_mps: default_parking_exit_speed_mps(),
            vehicle_confidence_floor: default_vehicle_confidence_floor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    #[serde(default = "default_floor_recent_short_seconds")]
    pub floor_recent_short_seconds: i64,
    #[serde(default = "default_floor_recent_long_seconds")]
    pub floor_recent_long_seconds: i64,
    #[serde(default = "default_near_window_very_close_m")]
    pub near_window_very_close_m: f64,
    #[serde(default = "default_near_window_close_m")]
    pub near_window_close_m: f64,
    #[serde(default = "default_zone_probably_inside_m")]
    pub zone_probably_inside_m: f64,
    #[serde(default = "default_zone_uncertain_m")]
    pub zone_uncertain_m: f64,
    #[serde(default = "default_zone_probably_outside_m")]
    pub zone_probably_outside_m: f64,
    #[serde(default = "default_recent_polygon_exit_seconds")]
    pub recent_polygon_exit_seconds: i64,
    #[serde(default = "default_polygon_sustained_seconds")]
    pub polygon_sustained_seconds: i64,
}

fn default_floor_recent_short_seconds() -> i64 {
    30
}
fn default_floor_recent_long_seconds() -> i64 {
    60
}
fn default_near_window_very_close_m() -> f64 {
    5.0
}
fn default_near_window_close_m() -> f64 {
    15.0
}
fn default_zone_probably_inside_m() -> f64 {
    15.0
}
fn default_zone_uncertain_m() -> f64 {
    30.0
}
fn default_zone_probably_outside_m() -> f64 {
    50.0
}
fn default_recent_polygon_exit_seconds() -> i64 {
    90
}
fn default_polygon_sustained_seconds() -> i64 {
    30
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            floor_recent_short_seconds: default_floor_recent_short_seconds(),
            floor_recent_long_seconds: default_floor_recent_long_seconds(),
            near_window_very_close_m: default_near_window_very_close_m(),
            near_window_close_m: default_near_window_close_m(),
            zone_probably_inside_m: default_zone_probably_inside_m(),
            zone_uncertain_m: default_zone_uncertain_m(),
            zone_probably_outside_m: default_zone_probably_outside_m(),
            recent_polygon_exit_seconds: default_recent_polygon_exit_seconds(),
            polygon_sustained_seconds: default_polygon_sustained_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessConfig {
    #[serde(default = "default_context_threshold_vehicle")]
    pub context_threshold_vehicle: f64,
    #[serde(default = "default_context_threshold_near_footprint")]
    pub context_threshold_near_footprint: f64,
    #[serde(default = "default_context_threshold_sustained_walk")]
    pub context_threshold_sustained_walk: f64,
    #[serde(default = "default_context_threshold_short_walk")]
    pub context_threshold_short_walk: f64,
    #[serde(default = "default_context_threshold_default")]
    pub context_threshold_default: f64,
    #[serde(default = "default_context_threshold_floor")]
    pub context_threshold_floor: f64,
    #[serde(default = "default_gps_penalty_floor_m")]
    pub gps_penalty_floor_m: f64,
    #[serde(default = "default_gps_penalty_ceiling_m")]
    pub gps_penalty_ceiling_m: f64,
    #[serde(default = "default_gps_ceiling_unknown_m")]
    pub gps_ceiling_unknown_m: f64,
    #[serde(default = "default_gps_timeout_seconds")]
    pub gps_timeout_seconds: i64,
    #[serde(default = "default_cold_start_distance_m")]
    pub cold_start_distance_m: f64,
    #[serde(default = "default_cold_start_confidence_ceiling")]
    pub cold_start_confidence_ceiling: f64,
    #[serde(default = "default_pressure_boost_full")]
    pub pressure_boost_full: f64,
    #[serde(default = "default_pressure_boost_half")]
    pub pressure_boost_half: f64,
    #[serde(default = "default_pressure_boost_cap")]
    pub pressure_boost_cap: f64,
    #[serde(default = "default_vote_min_confidence")]
    pub vote_min_confidence: f64,
    #[serde(default = "default_vote_window_stationary_seconds")]
    pub vote_window_stationary_seconds: i64,
    #[serde(default = "default_vote_window_moving_seconds")]
    pub vote_window_moving_seconds: i64,
    #[serde(default = "default_vote_winner_factor")]
    pub vote_winner_factor: f64,
    #[serde(default = "default_vote_streak_bonus_cap")]
    pub vote_streak_bonus_cap: f64,
}

fn default_context_threshold_vehicle() -> f64 {
    0.85
}
fn default_context_threshold_near_footprint() -> f64 {
    0.60
}
fn default_context_threshold_sustained_walk() -> f64 {
    0.55
}
fn default_context_threshold_short_walk() -> f64 {
    0.58
}
fn default_context_threshold_default() -> f64 {
    0.60
}
fn default_context_threshold_floor() -> f64 {
    0.05
}
fn default_gps_penalty_floor_m() -> f64 {
    40.0
}
fn default_gps_penalty_ceiling_m() -> f64 {
    80.0
}
fn default_gps_ceiling_unknown_m() -> f64 {
    80.0
}
fn default_gps_timeout_seconds() -> i64 {
    300
}
fn default_cold_start_distance_m() -> f64 {
    100.0
}
fn default_cold_start_confidence_ceiling() -> f64 {
    0.75
}
fn default_pressure_boost_full() -> f64 {
    0.10
}
fn default_pressure_boost_half() -> f64 {
    0.05
}
fn default_pressure_boost_cap() -> f64 {
    0.95
}
fn default_vote_min_confidence() -> f64 {
    0.55
}
fn default_vote_window_stationary_seconds() -> i64 {
    60
}
fn default_vote_window_moving_seconds() -> i64 {
    120
}
fn default_vote_winner_factor() -> f64 {
    2.5
}
fn default_vote_streak_bonus_cap() -> f64 {
    0.20
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            context_threshold_vehicle: default_context_threshold_vehicle(),
            context_threshold_near_footprint: default_context_threshold_near_footprint(),
            context_threshold_sustained_walk: default_context_threshold_sustained_walk(),
            context_threshold_short_walk: default_context_threshold_short_walk(),
            context_threshold_default: default_context_threshold_default(),
            context_threshold_floor: default_context_threshold_floor(),
            gps_penalty_floor_m: default_gps_penalty_floor_m(),
            gps_penalty_ceiling_m: default_gps_penalty_ceiling_m(),
            gps_ceiling_unknown_m: default_gps_ceiling_unknown_m(),
            gps_timeout_seconds: default_gps_timeout_seconds(),
            cold_start_distance_m: default_cold_start_distance_m(),
            cold_start_confidence_ceiling: default_cold_start_confidence_ceiling(),
            pressure_boost_full: default_pressure_boost_full(),
            pressure_boost_half: default_pressure_boost_half(),
            pressure_boost_cap: default_pressure_boost_cap(),
            vote_min_confidence: default_vote_min_confidence(),
            vote_window_stationary_seconds: default_vote_window_stationary_seconds(),
            vote_window_moving_seconds: default_vote_window_moving_seconds(),
            vote_winner_factor: default_vote_winner_factor(),
            vote_streak_bonus_cap: default_vote_streak_bonus_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeLockConfig {
    #[serde(default = "default_lock_create_confidence")]
    pub create_confidence: f64,
    #[serde(default = "default_lock_create_confidence_floor")]
    pub create_confidence_floor: f64,
    #[serde(default = "default_lock_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_lock_history_window_seconds")]
    pub history_window_seconds: i64,
    #[serde(default = "default_lock_near_footprint_m")]
    pub near_footprint_m: f64,
    #[serde(default = "default_break_confidence")]
    pub break_confidence: f64,
    #[serde(default = "default_max_lock_duration_seconds")]
    pub max_duration_seconds: i64,
}

fn default_lock_create_confidence() -> f64 {
    0.75
}
fn default_lock_create_confidence_floor() -> f64 {
    0.75
}
fn default_lock_min_samples() -> usize {
    8
}
fn default_lock_history_window_seconds() -> i64 {
    300
}
fn default_lock_near_footprint_m() -> f64 {
    30.0
}
fn default_break_confidence() -> f64 {
    0.85
}
fn default_max_lock_duration_seconds() -> i64 {
    600
}

impl Default for ModeLockConfig {
    fn default() -> Self {
        Self {
            create_confidence: default_lock_create_confidence(),
            create_confidence_floor: default_lock_create_confidence_floor(),
            min_samples: default_lock_min_samples(),
            history_window_seconds: default_lock_history_window_seconds(),
            near_footprint_m: default_lock_near_footprint_m(),
            break_confidence: default_break_confidence(),
            max_duration_seconds: default_max_lock_duration_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_drift_oscillation_count")]
    pub oscillation_count: usize,
    #[serde(default = "default_drift_sample_window")]
    pub sample_window: usize,
    #[serde(default = "default_drift_min_avg_distance_m")]
    pub min_avg_distance_m: f64,
    #[serde(default = "default_drift_floor_quiet_seconds")]
    pub floor_quiet_seconds: i64,
    #[serde(default = "default_drift_lock_confidence_current")]
    pub lock_confidence_current: f64,
    #[serde(default = "default_drift_lock_confidence_majority")]
    pub lock_confidence_majority: f64,
}

fn default_drift_oscillation_count() -> usize {
    3
}
fn default_drift_sample_window() -> usize {
    6
}
fn default_drift_min_avg_distance_m() -> f64 {
    8.0
}
fn default_drift_floor_quiet_seconds() -> i64 {
    60
}
fn default_drift_lock_confidence_current() -> f64 {
    0.70
}
fn default_drift_lock_confidence_majority() -> f64 {
    0.60
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            oscillation_count: default_drift_oscillation_count(),
            sample_window: default_drift_sample_window(),
            min_avg_distance_m: default_drift_min_avg_distance_m(),
            floor_quiet_seconds: default_drift_floor_quiet_seconds(),
            lock_confidence_current: default_drift_lock_confidence_current(),
            lock_confidence_majority: default_drift_lock_confidence_majority(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(default = "default_tunnel_enter_accuracy_m")]
    pub enter_recent_accuracy_m: f64,
    #[serde(default = "default_tunnel_enter_current_accuracy_m")]
    pub enter_current_accuracy_m: f64,
    #[serde(default = "default_tunnel_enter_speed_mps")]
    pub enter_speed_mps: f64,
    #[serde(default = "default_tunnel_exit_accuracy_m")]
    pub exit_accuracy_m: f64,
    #[serde(default = "default_tunnel_exit_timeout_seconds")]
    pub exit_timeout_seconds: i64,
    #[serde(default = "default_tunnel_confidence")]
    pub confidence: f64,
}

fn default_tunnel_enter_accuracy_m() -> f64 {
    40.0
}
fn default_tunnel_enter_current_accuracy_m() -> f64 {
    100.0
}
fn default_tunnel_enter_speed_mps() -> f64 {
    5.0
}
fn default_tunnel_exit_accuracy_m() -> f64 {
    50.0
}
fn default_tunnel_exit_timeout_seconds() -> i64 {
    600
}
fn default_tunnel_confidence() -> f64 {
    0.95
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enter_recent_accuracy_m: default_tunnel_enter_accuracy_m(),
            enter_current_accuracy_m: default_tunnel_enter_current_accuracy_m(),
            enter_speed_mps: default_tunnel_enter_speed_mps(),
            exit_accuracy_m: default_tunnel_exit_accuracy_m(),
            exit_timeout_seconds: default_tunnel_exit_timeout_seconds(),
            confidence: default_tunnel_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_stale_fix_seconds")]
    pub stale_fix_seconds: i64,
    #[serde(default = "default_ttl_moving_seconds")]
    pub ttl_moving_seconds: i64,
    #[serde(default = "default_ttl_stationary_confident_seconds")]
    pub ttl_stationary_confident_seconds: i64,
    #[serde(default = "default_ttl_default_seconds")]
    pub ttl_default_seconds: i64,
    #[serde(default = "default_restored_state_max_age_seconds")]
    pub restored_state_max_age_seconds: i64,
    #[serde(default = "default_tight_distance_filter_m")]
    pub tight_distance_filter_m: f64,
    #[serde(default = "default_relaxed_distance_filter_m")]
    pub relaxed_distance_filter_m: f64,
    #[serde(default = "default_post_exit_immediate_update_seconds")]
    pub post_exit_immediate_update_seconds: i64,
}

fn default_stale_fix_seconds() -> i64 {
    10
}
fn default_ttl_moving_seconds() -> i64 {
    30
}
fn default_ttl_stationary_confident_seconds() -> i64 {
    60
}
fn default_ttl_default_seconds() -> i64 {
    30
}
fn default_restored_state_max_age_seconds() -> i64 {
    300
}
fn default_tight_distance_filter_m() -> f64 {
    10.0
}
fn default_relaxed_distance_filter_m() -> f64 {
    15.0
}
fn default_post_exit_immediate_update_seconds() -> i64 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_fix_seconds: default_stale_fix_seconds(),
            ttl_moving_seconds: default_ttl_moving_seconds(),
            ttl_stationary_confident_seconds: default_ttl_stationary_confident_seconds(),
            ttl_default_seconds: default_ttl_default_seconds(),
            restored_state_max_age_seconds: default_restored_state_max_age_seconds(),
            tight_distance_filter_m: default_tight_distance_filter_m(),
            relaxed_distance_filter_m: default_relaxed_distance_filter_m(),
            post_exit_immediate_update_seconds: default_post_exit_immediate_update_seconds(),
        }
    }
}
