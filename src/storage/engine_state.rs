//! Persisted engine state — sled-backed storage for the data spec.md §6
//! requires to round-trip through a restart: capped motion/location
//! history, the footprint cache, the last published `DetectionState`, and
//! the manual-override record.
//!
//! Each concern lives in its own sled tree so independent caps/TTLs never
//! interfere with each other's iteration order.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::types::{DetectionState, HistoryEntry, ManualOverride, MotionSample};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const TREE_MOTION: &str = "motion_history";
const TREE_LOCATION: &str = "location_history";
const TREE_FOOTPRINT: &str = "footprint_cache";
const TREE_META: &str = "engine_meta";

const KEY_LAST_STATE: &[u8] = b"last_detection_state";
const KEY_MANUAL_OVERRIDE: &[u8] = b"manual_override";

/// Sled-backed persistence for everything the engine must survive a
/// restart with. Mirrors the teacher's `storage::history::HistoryStorage`
/// wrapper around `Arc<sled::Db>`.
#[derive(Clone)]
pub struct EngineStorage {
    db: Arc<sled::Db>,
}

impl EngineStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// In-memory, non-persistent instance — used by tests and by callers
    /// that opt out of disk persistence entirely.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    fn put<T: Serialize>(&self, tree: &str, key: &[u8], value: &T) -> Result<(), StorageError> {
        let tree = self.db.open_tree(tree)?;
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key, bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, tree: &str, key: &[u8]) -> Result<Option<T>, StorageError> {
        let tree = self.db.open_tree(tree)?;
        match tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn timestamp_key(t: DateTime<Utc>) -> [u8; 8] {
        t.timestamp_nanos_opt()
            .unwrap_or_else(|| t.timestamp() * 1_000_000_000)
            .to_be_bytes()
    }

    pub fn append_motion_sample(&self, sample: &MotionSample) -> Result<(), StorageError> {
        self.put(TREE_MOTION, &Self::timestamp_key(sample.t), sample)
    }

    pub fn recent_motion_samples(&self, limit: usize) -> Result<Vec<MotionSample>, StorageError> {
        let tree = self.db.open_tree(TREE_MOTION)?;
        let mut out = Vec::new();
        for item in tree.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item?;
            if let Ok(sample) = serde_json::from_slice::<MotionSample>(&value) {
                out.push(sample);
            }
        }
        Ok(out)
    }

    pub fn prune_motion_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        Self::prune_tree_before(&self.db.open_tree(TREE_MOTION)?, cutoff)
    }

    pub fn append_location_history(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        self.put(TREE_LOCATION, &Self::timestamp_key(entry.t), entry)
    }

    pub fn recent_location_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let tree = self.db.open_tree(TREE_LOCATION)?;
        let mut out = Vec::new();
        for item in tree.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item?;
            if let Ok(entry) = serde_json::from_slice::<HistoryEntry>(&value) {
                out.push(entry);
            }
        }
        Ok(out)
    }

    pub fn prune_location_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        Self::prune_tree_before(&self.db.open_tree(TREE_LOCATION)?, cutoff)
    }

    fn prune_tree_before(tree: &sled::Tree, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let cutoff_key = Self::timestamp_key(cutoff);
        let mut removed = 0;
        let to_remove: Vec<_> = tree
            .range(..cutoff_key.to_vec())
            .filter_map(|r| r.ok())
            .map(|(k, _)| k)
            .collect();
        for key in to_remove {
            tree.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Stores an arbitrary serializable cache entry under `cell_key`. Kept
    /// generic (rather than typed on `Footprint` directly) so
    /// `footprint_cache::persistence` can persist its TTL/negative-cache
    /// envelope alongside the footprints.
    pub fn store_footprint<T: Serialize>(&self, cell_key: &str, entry: &T) -> Result<(), StorageError> {
        self.put(TREE_FOOTPRINT, cell_key.as_bytes(), entry)
    }

    pub fn load_footprint<T: DeserializeOwned>(&self, cell_key: &str) -> Result<Option<T>, StorageError> {
        self.get(TREE_FOOTPRINT, cell_key.as_bytes())
    }

    pub fn store_last_state(&self, state: &DetectionState) -> Result<(), StorageError> {
        self.put(TREE_META, KEY_LAST_STATE, state)
    }

    /// Loads the last published state if present and no older than
    /// `max_age` — per spec.md §6, a restored state is "only used if ≤ 5
    /// min old".
    pub fn load_last_state(
        &self,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Result<Option<DetectionState>, StorageError> {
        let state: Option<DetectionState> = self.get(TREE_META, KEY_LAST_STATE)?;
        Ok(state.filter(|s| now - s.t <= max_age))
    }

    pub fn store_manual_override(&self, over: &ManualOverride) -> Result<(), StorageError> {
        self.put(TREE_META, KEY_MANUAL_OVERRIDE, over)
    }

    pub fn load_manual_override(&self) -> Result<Option<ManualOverride>, StorageError> {
        self.get(TREE_META, KEY_MANUAL_OVERRIDE)
    }

    pub fn clear_manual_override(&self) -> Result<(), StorageError> {
        let tree = self.db.open_tree(TREE_META)?;
        tree.remove(KEY_MANUAL_OVERRIDE)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Activity, Coord, Mode};

    fn sample_at(t: DateTime<Utc>) -> MotionSample {
        MotionSample {
            speed_mps: 1.0,
            activity: Activity::Walking,
            t,
        }
    }

    #[test]
    fn motion_samples_round_trip_in_insertion_order_reversed() {
        let storage = EngineStorage::temporary().unwrap();
        let t0 = Utc::now();
        storage.append_motion_sample(&sample_at(t0)).unwrap();
        storage
            .append_motion_sample(&sample_at(t0 + chrono::Duration::seconds(1)))
            .unwrap();
        let recent = storage.recent_motion_samples(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].t > recent[1].t, "most recent first");
    }

    #[test]
    fn prune_motion_before_removes_only_older_entries() {
        let storage = EngineStorage::temporary().unwrap();
        let old = Utc::now() - chrono::Duration::minutes(20);
        let recent = Utc::now();
        storage.append_motion_sample(&sample_at(old)).unwrap();
        storage.append_motion_sample(&sample_at(recent)).unwrap();

        let removed = storage
            .prune_motion_before(Utc::now() - chrono::Duration::minutes(10))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.recent_motion_samples(10).unwrap().len(), 1);
    }

    #[test]
    fn last_state_is_dropped_when_older_than_max_age() {
        let storage = EngineStorage::temporary().unwrap();
        let state = DetectionState {
            coord: Coord { lat: 0.0, lon: 0.0 },
            mode: Mode::Outside,
            confidence: 0.9,
            t: Utc::now() - chrono::Duration::minutes(10),
            is_stale: false,
            speed_mps: None,
            accuracy_m: None,
            activity: None,
            reason: None,
        };
        storage.store_last_state(&state).unwrap();
        let loaded = storage
            .load_last_state(Utc::now(), chrono::Duration::minutes(5))
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn manual_override_round_trips_and_clears() {
        let storage = EngineStorage::temporary().unwrap();
        let over = ManualOverride {
            started_at: Utc::now(),
            duration: chrono::Duration::seconds(60),
        };
        storage.store_manual_override(&over).unwrap();
        assert!(storage.load_manual_override().unwrap().is_some());
        storage.clear_manual_override().unwrap();
        assert!(storage.load_manual_override().unwrap().is_none());
    }
}
