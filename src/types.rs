//! Shared data model: modes, observations, and the engine's published state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The engine's output enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum Mode {
    Inside,
    Outside,
    Vehicle,
    #[default]
    Unknown,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mode::Inside => "inside",
            Mode::Outside => "outside",
            Mode::Vehicle => "vehicle",
            Mode::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Why a classification collapsed to `unknown` or low confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClassificationReason {
    BuildingDataUnavailable,
    PoorGpsAccuracy,
    InsufficientEvidence,
    None,
}

/// Which tier (or post-processing stage) produced a history entry.
///
/// Carried through for diagnostics and for the per-source decay weight used
/// by the stable-mode vote (see [`crate::postprocess::source_quality`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SignalSource {
    Floor,
    AccuracyPattern,
    Geofence,
    PressureChange,
    Polygon,
    DistanceMotion,
    Fallback,
    ManualOverride,
    Tunnel,
}

/// Coarse motion-activity classification as reported by the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Activity {
    Stationary,
    Walking,
    Running,
    Cycling,
    Automotive,
    Unknown,
}

/// A single geographic observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: f64,
    pub speed_mps: Option<f64>,
    pub floor_level: Option<i32>,
    pub t: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MotionSample {
    pub speed_mps: f64,
    pub activity: Activity,
    pub t: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PressureSample {
    pub pressure_hpa: f64,
    pub relative_altitude_m: f64,
    pub t: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracySample {
    pub accuracy_m: f64,
    pub coord: Coord,
    pub t: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub mode: Mode,
    pub confidence: f64,
    pub coord: Coord,
    pub accuracy: Option<f64>,
    pub source: SignalSource,
    pub reason: Option<ClassificationReason>,
    pub t: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolygonEntryRecord {
    pub building_id: String,
    pub entered_at: DateTime<Utc>,
    pub entry_coord: Coord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolygonExitRecord {
    pub building_id: String,
    pub exited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriftSample {
    pub mode: Mode,
    pub coord: Coord,
    pub confidence: f64,
    pub t: DateTime<Utc>,
}

/// A closed building-outline polygon retrieved from the map-footprint
/// service. `polygon` is guaranteed closed (first == last) by the time it
/// reaches [`crate::geometry`] — [`crate::footprint_cache`] closes it if the
/// upstream response was not already closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Footprint {
    pub id: String,
    pub polygon: Vec<Coord>,
    pub tags: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeLock {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub locked_confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ManualOverride {
    pub started_at: DateTime<Utc>,
    pub duration: chrono::Duration,
}

impl ManualOverride {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at < self.duration
    }
}

/// The result a tier (or the stable-mode vote) hands back: either a
/// classification, or "no decision" — tiers never panic or throw to signal
/// "I don't know", they simply decline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub mode: Mode,
    pub confidence: f64,
    pub reason: Option<ClassificationReason>,
    pub source: SignalSource,
}

impl ClassificationResult {
    pub fn new(mode: Mode, confidence: f64, source: SignalSource) -> Self {
        Self {
            mode,
            confidence,
            reason: None,
            source,
        }
    }

    pub fn with_reason(
        mode: Mode,
        confidence: f64,
        reason: ClassificationReason,
        source: SignalSource,
    ) -> Self {
        Self {
            mode,
            confidence,
            reason: Some(reason),
            source,
        }
    }
}

/// "No decision" is modeled as `Option<ClassificationResult>` at tier
/// boundaries — `None` means "pass, let the next tier try".
pub type TierOutcome = Option<ClassificationResult>;

/// The engine's published output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionState {
    pub coord: Coord,
    pub mode: Mode,
    pub confidence: f64,
    pub t: DateTime<Utc>,
    pub is_stale: bool,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub activity: Option<Activity>,
    pub reason: Option<ClassificationReason>,
}

/// Emitted on every mode change; consumed by the (out-of-scope) UV tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub confidence: f64,
    pub trigger: SignalSource,
    pub duration_in_from: Option<chrono::Duration>,
}
