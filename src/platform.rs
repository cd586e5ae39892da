//! Platform collaborator trait (§6) — the location subsystem, the
//! barometer, and motion recognition are all out of scope; this module
//! only declares the inbound callbacks it must fire and the outbound
//! commands the engine may issue. Grounded on `acquisition::mod`'s
//! `SensorSource` trait (`#[async_trait]`, `Send + Sync`,
//! connect/disconnect/read shape).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{Activity, Coord};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("location subsystem unavailable")]
    LocationUnavailable,
    #[error("region monitoring failed for {0}: {1}")]
    RegionMonitoringFailed(String, String),
    #[error("barometer unavailable")]
    BarometerUnavailable,
}

/// A stationary-hint event from the platform's visit-detection API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    pub arrival_coord: Coord,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: Option<DateTime<Utc>>,
}

/// Inbound callbacks the platform location service fires into the engine,
/// and the outbound commands the engine may issue back to it. One
/// instance is injected at construction — there is no process-wide
/// singleton (spec.md §9 "Singletons").
#[async_trait]
pub trait LocationService: Send + Sync {
    /// Fires on every geographic update.
    async fn on_fix(
        &mut self,
        coord: Coord,
        accuracy_m: f64,
        speed_mps: Option<f64>,
        floor_level: Option<i32>,
        timestamp: DateTime<Utc>,
    );

    /// Stationary hint from the platform's visit-detection API.
    async fn on_visit(&mut self, visit: Visit);

    /// Circular-geofence wakeup — enter/exit only trigger a classification
    /// cycle, they never decide a mode themselves (spec.md §6).
    async fn on_region_enter(&mut self, region_id: String);
    async fn on_region_exit(&mut self, region_id: String);

    async fn on_pressure_sample(&mut self, pressure_hpa: f64, relative_altitude_m: f64, timestamp: DateTime<Utc>);

    async fn on_motion_update(&mut self, activity: Activity, timestamp: DateTime<Utc>);

    /// Tightens or relaxes the platform's distance filter (spec.md §4.7
    /// "Adaptive observation rate").
    async fn set_distance_filter(&mut self, metres: f64) -> Result<(), PlatformError>;

    /// Requests one immediate fix outside the normal cadence.
    async fn request_immediate_update(&mut self) -> Result<(), PlatformError>;

    /// Arms a circular geofence. The engine sets these up around the 20
    /// nearest footprints within a 30 m radius each, for wakeup only.
    async fn start_monitoring_region(&mut self, centre: Coord, radius_m: f64, region_id: String) -> Result<(), PlatformError>;

    async fn stop_monitoring_region(&mut self, region_id: String) -> Result<(), PlatformError>;

    /// Re-zeroes the barometer's relative-altitude baseline.
    async fn reset_altimeter_baseline(&mut self) -> Result<(), PlatformError>;
}
