//! Top-level error types. Per-cycle recoverable conditions (spec.md §7:
//! `buildingDataUnavailable`, `poorGPSAccuracy`, `insufficientEvidence`) are
//! represented as `reason` on [`crate::types::DetectionState`], never as
//! `Result::Err` — these two enums are reserved for conditions a correctly
//! operating engine should not otherwise encounter.

#[derive(Debug, thiserror::Error)]
pub enum MapServiceError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by map service")]
    RateLimited,
    #[error("http error: {0}")]
    Http(String),
    #[error("failed to decode map service response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MapServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MapServiceError::Timeout
        } else {
            MapServiceError::Http(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
