use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("settings do not match the expected shape: {0}")]
    Deserialize(String),

    /// A single setting rejected by the hand-written checks.
    #[error("invalid setting `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("unknown environment '{0}', expected development, test, staging or production")]
    UnknownEnvironment(String),

    /// `TIERCACHE_CONFIG_DIR` and `TIERCACHE_CONFIG_FILE` select different
    /// loading modes and cannot be combined.
    #[error("TIERCACHE_CONFIG_DIR and TIERCACHE_CONFIG_FILE are both set, pick one")]
    ConflictingSources,

    #[error("invalid settings in {section}: {source}")]
    Invalid {
        section: String,
        #[source]
        source: validator::ValidationErrors,
    },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ConfigError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap `validator` errors for a section such as `queues[0]`.
    pub fn invalid<S: Into<String>>(section: S, source: validator::ValidationErrors) -> Self {
        ConfigError::Invalid {
            section: section.into(),
            source,
        }
    }
}
