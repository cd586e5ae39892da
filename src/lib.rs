//! context-engine: indoor / outdoor / vehicle context inference for mobile
//! devices.
//!
//! A per-fix classification pipeline that turns raw GPS/barometer/motion
//! signals into a stabilized [`types::Mode`] (inside / outside / vehicle /
//! unknown), weighing six priority-ordered tiers against a stateful
//! post-processing stage that guards against GPS jitter, cold starts, and
//! oscillation at building edges.
//!
//! ## Architecture
//!
//! - **FootprintCache (C2)**: coarse-grid, TTL'd cache of building
//!   footprints fetched from a map service, with in-flight coalescing.
//! - **ObservationHistory (C3)**: ring buffers of recent motion, accuracy,
//!   pressure, and location samples the tiers and post-processor read back.
//! - **MotionAnalyzer (C4)**: rule-based vehicle/walking/running/cyclist
//!   classification with persistence across stops.
//! - **TierClassifier (C5)**: floor, accuracy-pattern, polygon, and
//!   fallback tiers, dispatched in priority order.
//! - **PostProcessor (C6)**: GPS penalty, pressure validation, cold-start
//!   guard, drift detection, and mode-lock enforcement.
//! - **DetectionEngine (C7)**: orchestrates a per-fix cycle across all of
//!   the above and publishes the result.

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod footprint_cache;
pub mod geometry;
pub mod history;
pub mod motion;
pub mod platform;
pub mod postprocess;
pub mod storage;
pub mod tiers;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use engine::{CycleOutcome, DetectionEngine, RegionRequest};
pub use errors::{EngineError, MapServiceError};
pub use footprint_cache::{FootprintCache, MapServiceClient};
pub use platform::{LocationService, PlatformError, Visit};
pub use types::{
    ClassificationReason, ClassificationResult, Coord, DetectionState, Fix, Footprint, Mode,
    ModeTransition, SignalSource,
};
