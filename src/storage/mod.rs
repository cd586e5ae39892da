//! Persistence for the engine's restart-surviving state.
//!
//! `EngineStorage` holds capped motion/location history, the footprint
//! cache, the last published `DetectionState`, and the manual-override
//! record — everything spec.md §6 lists under "Persisted state". `ProcessLock`
//! prevents two engine instances from opening the same sled database.

#![allow(dead_code)]

pub mod engine_state;
pub mod lockfile;

pub use engine_state::{EngineStorage, StorageError};
pub use lockfile::ProcessLock;
