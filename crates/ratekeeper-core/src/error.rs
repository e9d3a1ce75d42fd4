//! Domain-level error types.

use thiserror::Error;

/// Policy misconfiguration - a programming error raised at setup time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown rate limit preset: {0}")]
    UnknownPreset(String),

    #[error("Rate limit window must be greater than zero")]
    ZeroWindow,

    #[error("Rate limit max must be at least 1")]
    ZeroMax,

    #[error("Invalid failure mode: {0}")]
    InvalidFailureMode(String),
}

/// Counter store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Store operation failed: {0}")]
    Operation(String),
}

/// Event log errors.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Event log backend error: {0}")]
    Backend(String),

    #[error("Event serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventLogError {
    fn from(err: serde_json::Error) -> Self {
        EventLogError::Serialization(err.to_string())
    }
}
