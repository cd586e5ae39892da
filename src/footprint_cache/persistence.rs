//! Disk persistence for footprint cache entries, so a restart doesn't
//! require re-querying the map service for every cell the device has
//! already seen. Grounded on `storage::engine_state`'s sled-tree wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{EngineStorage, StorageError};
use crate::types::Footprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCacheEntry {
    pub footprints: Vec<Footprint>,
    pub fetched_at: DateTime<Utc>,
    pub negative: bool,
}

impl EngineStorage {
    pub fn store_footprint_cell(
        &self,
        cell_key: &str,
        entry: &PersistedCacheEntry,
    ) -> Result<(), StorageError> {
        self.store_footprint(cell_key, entry)
    }

    pub fn load_footprint_cell(
        &self,
        cell_key: &str,
    ) -> Result<Option<PersistedCacheEntry>, StorageError> {
        self.load_footprint(cell_key)
    }
}
