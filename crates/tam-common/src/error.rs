//! Error types for the tile index and bulk tile store.

use thiserror::Error;

use crate::tile::TileError;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the metadata index or the bulk tile store.
///
/// These are never retried by the computation layer; they propagate to the
/// caller unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Index query failed: {0}")]
    Index(String),

    #[error("Bulk fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to decode tile payload: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Object not found: {0}")]
    NotFound(String),
}

impl From<TileError> for StoreError {
    fn from(err: TileError) -> Self {
        StoreError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(format!("JSON error: {}", err))
    }
}
