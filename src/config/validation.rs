//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use std::collections::HashSet;

use validator::Validate;

use crate::cache::KeyPattern;
use crate::config::error::ConfigError;
use crate::config::settings::{
    CacheSettings, ColdBackend, ColdTierConfig, FileSettings, LoggerSettings, QueueSettings,
    Settings,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Valid Redis URL schemes
const VALID_REDIS_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

impl FileSettings {
    /// Validate file settings
    fn validate(&self) -> Result<(), ConfigError> {
        // If file logging is enabled, path must not be empty
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error
    /// - If file logging is enabled, path must not be empty
    /// - Log format must be one of: full, compact, json
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        self.file.validate()?;

        Ok(())
    }
}

impl ColdTierConfig {
    /// Validate cold tier settings
    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::validation(
                "cache.cold.retry_attempts",
                "Retry attempts must be at least 1.",
            ));
        }

        match self.backend {
            ColdBackend::Memory => {
                if self.memory_max_entries == 0 {
                    return Err(ConfigError::validation(
                        "cache.cold.memory_max_entries",
                        "Memory backend needs room for at least one entry.",
                    ));
                }
            }
            ColdBackend::Redis => {
                let redis = &self.redis;
                for (field, url) in [
                    ("cache.cold.redis.url", redis.url.as_str()),
                    ("cache.cold.redis.fallback_url", redis.fallback_url()),
                ] {
                    if !VALID_REDIS_SCHEMES.iter().any(|s| url.starts_with(s)) {
                        return Err(ConfigError::ValidationError {
                            field: field.to_string(),
                            message: format!(
                                "Invalid Redis URL '{}'. Expected one of: {}",
                                url,
                                VALID_REDIS_SCHEMES.join(", ")
                            ),
                        });
                    }
                }
                if redis.pool_size == 0 {
                    return Err(ConfigError::validation(
                        "cache.cold.redis.pool_size",
                        "Pool size must be greater than 0.",
                    ));
                }
                if redis.tls_enabled && !redis.url.starts_with("rediss://") {
                    return Err(ConfigError::validation(
                        "cache.cold.redis.url",
                        "TLS requires a rediss:// URL.",
                    ));
                }
            }
        }

        Ok(())
    }
}

impl CacheSettings {
    /// Validate cache settings
    ///
    /// # Validation Rules
    /// - Enabled in-process tiers need a non-zero entry bound
    /// - Refresh-ahead threshold must lie in (0, 1]
    /// - Every invalidation pattern must compile
    /// - Cascade depth must be at least 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, tier) in [("cache.hot", &self.hot), ("cache.query", &self.query)] {
            if tier.enabled && tier.max_entries == 0 {
                return Err(ConfigError::ValidationError {
                    field: format!("{}.max_entries", field),
                    message: "Max entries must be greater than 0 for an enabled tier.".to_string(),
                });
            }
        }

        if !(self.refresh_ahead_threshold > 0.0 && self.refresh_ahead_threshold <= 1.0) {
            return Err(ConfigError::ValidationError {
                field: "cache.refresh_ahead_threshold".to_string(),
                message: format!(
                    "Threshold must be in (0, 1], got {}",
                    self.refresh_ahead_threshold
                ),
            });
        }

        self.cold.validate()?;

        if self.invalidation.max_depth == 0 {
            return Err(ConfigError::validation(
                "cache.invalidation.max_depth",
                "Cascade depth must be at least 1.",
            ));
        }

        for (i, rule) in self.invalidation.rules.iter().enumerate() {
            for pattern in std::iter::once(&rule.source).chain(rule.dependents.iter()) {
                KeyPattern::compile(pattern).map_err(|e| ConfigError::ValidationError {
                    field: format!("cache.invalidation.rules[{}]", i),
                    message: e.to_string(),
                })?;
            }
        }

        Ok(())
    }
}

fn validate_queues(queues: &[QueueSettings]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, queue) in queues.iter().enumerate() {
        Validate::validate(queue).map_err(|e| ConfigError::invalid(format!("queues[{}]", i), e))?;

        if !seen.insert(queue.name.as_str()) {
            return Err(ConfigError::ValidationError {
                field: format!("queues[{}].name", i),
                message: format!("Queue '{}' is configured more than once.", queue.name),
            });
        }
    }
    Ok(())
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// This method validates all sub-configurations and returns the first
    /// validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger.validate()?;
        self.cache.validate()?;
        validate_queues(&self.queues)?;
        Ok(())
    }
}
