//! Error types for the time-average computation.

use tam_common::{BboxError, StoreError, TimeRangeError};
use thiserror::Error;

/// Errors that abort a time-average computation.
///
/// Index overflow is not an error; it is handled by bisection and never
/// reaches the caller.
#[derive(Error, Debug)]
pub enum TimeAverageError {
    /// The request volume is empty, inverted or not finite.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No tiles were found anywhere in the searched range.
    #[error("no data: {0}")]
    NoData(String),

    /// The index or the bulk store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The bulk store returned fewer tiles than the index described.
    #[error("bulk store is missing data for {} tile(s): {}", missing.len(), missing.join(", "))]
    MissingTileData { missing: Vec<String> },

    /// The index kept overflowing on a volume that can no longer be split.
    #[error("index still overflows at depth {depth} (limit {limit}) for {volume}")]
    BisectionExhausted {
        depth: usize,
        limit: usize,
        volume: String,
    },

    /// Two partial grids with different keys or shapes were combined.
    #[error("incompatible grids: {0}")]
    IncompatibleGrids(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to write the output artifact.
    #[error("failed to write output: {0}")]
    Write(String),

    /// A compute unit panicked or was cancelled.
    #[error("compute unit failed to complete: {0}")]
    Join(String),
}

impl TimeAverageError {
    /// Create an InvalidQuery error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a NoData error.
    pub fn no_data(msg: impl Into<String>) -> Self {
        Self::NoData(msg.into())
    }

    /// Create a Write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }
}

impl From<BboxError> for TimeAverageError {
    fn from(err: BboxError) -> Self {
        Self::InvalidQuery(err.to_string())
    }
}

impl From<TimeRangeError> for TimeAverageError {
    fn from(err: TimeRangeError) -> Self {
        Self::InvalidQuery(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TimeAverageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

impl From<std::io::Error> for TimeAverageError {
    fn from(err: std::io::Error) -> Self {
        Self::Write(err.to_string())
    }
}

/// Result type for time-average operations.
pub type Result<T> = std::result::Result<T, TimeAverageError>;
