//! FootprintCache (C2) — coarse-grid, TTL'd cache of building footprints
//! fetched from the map service, with in-flight request coalescing so a
//! burst of fixes landing in the same grid cell issues one HTTP call, not
//! one per fix. Grounded on `hub::api::pairing`'s `Arc<DashMap<..>>` store
//! and `fleet::client::FleetClient`'s retry-with-backoff loop.

pub mod client;
pub mod persistence;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::config::FootprintCacheConfig;
use crate::storage::EngineStorage;
use crate::types::{Coord, Footprint};

pub use client::MapServiceClient;
pub use persistence::PersistedCacheEntry;

/// Coarse grid cell identifying a lat/lon bucket. Two fixes that round to
/// the same cell share one cache entry and one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    lat_bucket: i64,
    lon_bucket: i64,
}

impl CacheKey {
    fn from_coord(coord: Coord, precision_factor: f64) -> Self {
        Self {
            lat_bucket: (coord.lat * precision_factor).round() as i64,
            lon_bucket: (coord.lon * precision_factor).round() as i64,
        }
    }

    fn as_storage_key(&self) -> String {
        format!("{}:{}", self.lat_bucket, self.lon_bucket)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    footprints: Vec<Footprint>,
    fetched_at: chrono::DateTime<Utc>,
    negative: bool,
}

impl CacheEntry {
    fn is_fresh(&self, now: chrono::DateTime<Utc>, cfg: &FootprintCacheConfig) -> bool {
        let ttl = if self.negative {
            cfg.negative_cache_seconds
        } else {
            cfg.ttl_seconds
        };
        (now - self.fetched_at) < chrono::Duration::seconds(ttl)
    }
}

/// Queries the map service for building footprints near a fix, caching
/// results per coarse grid cell. On fetch failure, serves the last
/// known-good entry for that cell (however stale) rather than returning
/// nothing, and records the failure so callers can fall back to Tier 5.
pub struct FootprintCache {
    client: MapServiceClient,
    storage: Option<EngineStorage>,
    cfg: FootprintCacheConfig,
    cache: DashMap<CacheKey, CacheEntry>,
    in_flight: DashMap<CacheKey, Arc<AsyncMutex<()>>>,
}

impl FootprintCache {
    pub fn new(client: MapServiceClient, storage: Option<EngineStorage>, cfg: FootprintCacheConfig) -> Self {
        Self {
            client,
            storage,
            cfg,
            cache: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Returns the footprints for the grid cell containing `coord`, and
    /// whether the underlying fetch failed (fresh or stale-cache data may
    /// still be returned even on failure).
    pub async fn lookup(&self, coord: Coord) -> (Vec<Footprint>, bool) {
        let key = CacheKey::from_coord(coord, self.cfg.cell_precision_factor);
        let now = Utc::now();

        if let Some(entry) = self.cache.get(&key) {
            if entry.is_fresh(now, &self.cfg) {
                return (entry.footprints.clone(), false);
            }
        }

        let gate = self
            .in_flight
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _permit = gate.lock().await;

        // Another waiter may have refreshed the cell while we queued for the lock.
        if let Some(entry) = self.cache.get(&key) {
            if entry.is_fresh(Utc::now(), &self.cfg) {
                self.in_flight.remove(&key);
                return (entry.footprints.clone(), false);
            }
        }

        let result = self.fetch_with_retries(coord).await;
        self.in_flight.remove(&key);

        match result {
            Ok(footprints) => {
                let entry = CacheEntry {
                    footprints: footprints.clone(),
                    fetched_at: Utc::now(),
                    negative: footprints.is_empty(),
                };
                self.persist(&key, &entry);
                self.cache.insert(key, entry);
                (footprints, false)
            }
            Err(e) => {
                warn!(error = %e, "footprint fetch failed, serving last known-good");
                let stale = self
                    .cache
                    .get(&key)
                    .map(|e| e.footprints.clone())
                    .or_else(|| self.load_persisted(&key).map(|e| e.footprints))
                    .unwrap_or_default();
                // Record the failure itself, not just its stale payload, so
                // the next lookup within `negative_cache_seconds` is served
                // from here instead of re-entering the retry loop.
                self.cache.insert(
                    key,
                    CacheEntry {
                        footprints: stale.clone(),
                        fetched_at: Utc::now(),
                        negative: true,
                    },
                );
                (stale, true)
            }
        }
    }

    async fn fetch_with_retries(&self, coord: Coord) -> Result<Vec<Footprint>, crate::errors::MapServiceError> {
        let mut attempt = 0;
        loop {
            match self.client.query_footprints(coord, self.cfg.query_radius_m).await {
                Ok(footprints) => return Ok(footprints),
                Err(e) if attempt < self.cfg.max_retries => {
                    attempt += 1;
                    let backoff = StdDuration::from_millis((self.cfg.retry_backoff_ms * attempt as i64) as u64);
                    debug!(attempt, error = %e, "retrying footprint fetch");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn persist(&self, key: &CacheKey, entry: &CacheEntry) {
        let Some(storage) = &self.storage else { return };
        let persisted = PersistedCacheEntry {
            footprints: entry.footprints.clone(),
            fetched_at: entry.fetched_at,
            negative: entry.negative,
        };
        if let Err(e) = storage.store_footprint(&key.as_storage_key(), &persisted) {
            warn!(error = %e, "failed to persist footprint cache entry");
        }
    }

    fn load_persisted(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage = self.storage.as_ref()?;
        let persisted = storage.load_footprint(&key.as_storage_key()).ok().flatten()?;
        Some(CacheEntry {
            footprints: persisted.footprints,
            fetched_at: persisted.fetched_at,
            negative: persisted.negative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_coord_maps_to_same_cell() {
        let a = CacheKey::from_coord(Coord { lat: 40.7484, lon: -73.9857 }, 1e3);
        let b = CacheKey::from_coord(Coord { lat: 40.7484001, lon: -73.98571 }, 1e3);
        assert_eq!(a, b);
    }

    #[test]
    fn distant_coords_map_to_different_cells() {
        let a = CacheKey::from_coord(Coord { lat: 40.7484, lon: -73.9857 }, 1e3);
        let b = CacheKey::from_coord(Coord { lat: 40.76, lon: -73.9857 }, 1e3);
        assert_ne!(a, b);
    }

    #[test]
    fn negative_entry_uses_negative_cache_ttl() {
        let cfg = FootprintCacheConfig::default();
        let entry = CacheEntry {
            footprints: vec![],
            fetched_at: Utc::now() - chrono::Duration::seconds(cfg.negative_cache_seconds + 10),
            negative: true,
        };
        assert!(!entry.is_fresh(Utc::now(), &cfg));
    }

    #[tokio::test]
    async fn failed_fetch_populates_a_negative_cache_entry() {
        let mut cfg = FootprintCacheConfig::default();
        cfg.max_retries = 0;
        let client = MapServiceClient::new("http://127.0.0.1:1", StdDuration::from_millis(200));
        let cache = FootprintCache::new(client, None, cfg.clone());
        let coord = Coord { lat: 40.0, lon: -73.0 };

        let (footprints, failed) = cache.lookup(coord).await;
        assert!(failed);
        assert!(footprints.is_empty());

        let key = CacheKey::from_coord(coord, cfg.cell_precision_factor);
        let entry = cache.cache.get(&key).expect("a failed fetch should still write a cache entry");
        assert!(entry.negative);
        assert!(entry.is_fresh(Utc::now(), &cfg));
    }
}
