use thiserror::Error;

use crate::cache::CacheError;
use crate::config::error::ConfigError;
use crate::queue::JobError;

/// Application-wide error type.
///
/// Subsystems keep their own error enums; this type is what the
/// application layer (state lifecycle, CLI) returns.
#[derive(Error, Debug)]
pub enum AppError {
    /// Cache subsystem failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Queue subsystem failure
    #[error("Queue error: {0}")]
    Job(#[from] JobError),

    /// Configuration error
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;
