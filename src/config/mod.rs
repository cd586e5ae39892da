//! Detection configuration module.
//!
//! Provides the engine's operator-tunable thresholds loaded from TOML,
//! replacing the hardcoded constants of spec.md with configurable values.
//!
//! ## Loading order
//!
//! 1. `CONTEXT_ENGINE_CONFIG` environment variable (path to TOML file)
//! 2. `detection_config.toml` in the current working directory
//! 3. Built-in defaults (matching spec.md's literal constants)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(DetectionConfig::load());
//! let ttl = config::get().footprint_cache.ttl_seconds;
//! ```

mod detection_config;
mod validation;

pub use detection_config::*;

use std::sync::OnceLock;

static DETECTION_CONFIG: OnceLock<DetectionConfig> = OnceLock::new();

/// Initialize the global detection configuration. Must be called exactly
/// once before any calls to `get()`.
pub fn init(config: DetectionConfig) {
    if DETECTION_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global detection configuration.
///
/// Panics if `init()` has not been called — a missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static DetectionConfig {
    DETECTION_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    DETECTION_CONFIG.get().is_some()
}
