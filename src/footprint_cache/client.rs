//! HTTP client for the map-footprint service — grounded on
//! `fleet::client::FleetClient` (a `reqwest::Client` builder, a typed
//! `thiserror` error enum with `#[from] reqwest::Error`, status-code match).

use serde::Deserialize;

use crate::errors::MapServiceError;
use crate::types::{Coord, Footprint};

#[derive(Debug, Deserialize)]
struct FootprintResponse {
    id: String,
    polygon: Vec<[f64; 2]>,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
}

/// Thin wrapper around `reqwest::Client` for querying building footprints
/// near a coordinate. One instance is shared (cloned — `reqwest::Client` is
/// internally `Arc`-backed) across the cache's concurrent lookups.
#[derive(Clone)]
pub struct MapServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl MapServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build map-service HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetches every building footprint within `radius_m` of `center`.
    /// Closes each polygon (appends the first vertex if the upstream
    /// response omitted it) before returning.
    pub async fn query_footprints(
        &self,
        center: Coord,
        radius_m: f64,
    ) -> Result<Vec<Footprint>, MapServiceError> {
        let resp = self
            .http
            .get(format!("{}/v1/footprints", self.base_url))
            .query(&[
                ("lat", center.lat.to_string()),
                ("lon", center.lon.to_string()),
                ("radius_m", radius_m.to_string()),
            ])
            .send()
            .await?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                let body: Vec<FootprintResponse> = resp.json().await?;
                Ok(body.into_iter().map(Into::into).collect())
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(MapServiceError::RateLimited),
            status => Err(MapServiceError::Http(status.to_string())),
        }
    }
}

impl From<FootprintResponse> for Footprint {
    fn from(r: FootprintResponse) -> Self {
        let polygon = crate::geometry::close_polygon(
            r.polygon.into_iter().map(|[lat, lon]| Coord { lat, lon }).collect(),
        );
        Footprint {
            id: r.id,
            polygon,
            tags: r.tags,
        }
    }
}
