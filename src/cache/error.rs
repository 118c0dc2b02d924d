//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache operation failed: {0}")]
    Operation(String),

    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// The cold tier could not be reached even after falling back.
    /// Distinct from a miss: freshness of the key is unknown.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The backing store rejected a write-through value.
    #[error("Persist failed: {0}")]
    Persist(String),
}

impl CacheError {
    /// Whether this error reports a transport problem rather than a bad value.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CacheError::Connection(_) | CacheError::Unavailable(_) | CacheError::Operation(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(error.to_string())
    }
}
