//! Configuration settings structures for tiercache
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};
use crate::queue::{Backoff, DefaultJobOptions, QueueConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "tiercache".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/tiercache.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_refresh_ahead_threshold() -> f64 {
    0.8
}

fn default_hot_max_entries() -> usize {
    1000
}

fn default_query_max_entries() -> usize {
    500
}

fn default_cold_memory_max_entries() -> usize {
    100_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    4
}

fn default_redis_connection_timeout() -> u64 {
    5
}

fn default_redis_key_prefix() -> String {
    "tiercache".to_string()
}

fn default_max_depth() -> usize {
    1
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff() -> Backoff {
    Backoff::Exponential { delay_ms: 2000 }
}

fn default_keep_completed() -> usize {
    100
}

fn default_keep_failed() -> usize {
    50
}

fn default_stalled_interval_ms() -> u64 {
    30_000
}

fn default_max_stalled_count() -> u32 {
    1
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert LoggerSettings to LoggerConfig
    ///
    /// This method transforms the configuration file representation into
    /// the runtime LoggerConfig used by the logger module.
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_config = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file_config = self.file.into_file_config()?;

        LoggerConfig::new(console_config, file_config, self.level).map_err(|e| {
            ConfigError::ValidationError {
                field: "logger".to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl FileSettings {
    /// Convert FileSettings to FileConfig
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format).map_err(
            |e| ConfigError::ValidationError {
                field: "logger.file".to_string(),
                message: e.to_string(),
            },
        )
    }
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Cold tier backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColdBackend {
    /// In-process store, for development and tests
    #[default]
    Memory,
    /// Redis reached through a bb8 pool
    Redis,
}

/// In-process tier configuration (hot and query tiers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTierConfig {
    /// Whether the tier participates in reads and writes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,
}

impl MemoryTierConfig {
    fn hot() -> Self {
        Self {
            enabled: true,
            max_entries: default_hot_max_entries(),
        }
    }

    fn query() -> Self {
        Self {
            enabled: true,
            max_entries: default_query_max_entries(),
        }
    }
}

fn default_hot_tier() -> MemoryTierConfig {
    MemoryTierConfig::hot()
}

fn default_query_tier() -> MemoryTierConfig {
    MemoryTierConfig::query()
}

/// Redis connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Primary Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Single-node URL used while the primary is unreachable.
    /// Defaults to `url` when unset.
    #[serde(default)]
    pub fallback_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,

    /// Key prefix for all cache entries
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,

    /// Whether to use TLS
    #[serde(default)]
    pub tls_enabled: bool,
}

impl RedisCacheConfig {
    /// The URL of the single-node fallback client.
    pub fn fallback_url(&self) -> &str {
        self.fallback_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            fallback_url: None,
            pool_size: default_redis_pool_size(),
            connection_timeout: default_redis_connection_timeout(),
            key_prefix: default_redis_key_prefix(),
            tls_enabled: false,
        }
    }
}

/// Cold (distributed) tier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdTierConfig {
    /// Whether the tier participates in reads and writes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend type
    #[serde(default)]
    pub backend: ColdBackend,

    /// Entry bound of the in-process backend
    #[serde(default = "default_cold_memory_max_entries")]
    pub memory_max_entries: usize,

    /// Attempts per call before the failure is surfaced
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Redis settings
    #[serde(default)]
    pub redis: RedisCacheConfig,
}

impl Default for ColdTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: ColdBackend::default(),
            memory_max_entries: default_cold_memory_max_entries(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            redis: RedisCacheConfig::default(),
        }
    }
}

/// A single `source -> dependents` invalidation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRuleConfig {
    /// Pattern of the written key, e.g. `user:*`
    pub source: String,

    /// Patterns deleted when the source matches
    #[serde(default)]
    pub dependents: Vec<String>,
}

/// Invalidation registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationSettings {
    /// How many rule hops a cascade may follow (1 = direct dependents only)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Rules, registered once at startup
    #[serde(default)]
    pub rules: Vec<InvalidationRuleConfig>,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            rules: Vec::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL applied when a call does not supply one (seconds, 0 = no expiry)
    #[serde(default = "default_cache_ttl")]
    pub default_ttl: u64,

    /// Elapsed TTL fraction after which refresh-ahead recomputes
    #[serde(default = "default_refresh_ahead_threshold")]
    pub refresh_ahead_threshold: f64,

    /// Hot tier settings
    #[serde(default = "default_hot_tier")]
    pub hot: MemoryTierConfig,

    /// Query tier settings
    #[serde(default = "default_query_tier")]
    pub query: MemoryTierConfig,

    /// Cold tier settings
    #[serde(default)]
    pub cold: ColdTierConfig,

    /// Invalidation rules
    #[serde(default)]
    pub invalidation: InvalidationSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: default_cache_ttl(),
            refresh_ahead_threshold: default_refresh_ahead_threshold(),
            hot: MemoryTierConfig::hot(),
            query: MemoryTierConfig::query(),
            cold: ColdTierConfig::default(),
            invalidation: InvalidationSettings::default(),
        }
    }
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// One named queue, provisioned at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QueueSettings {
    /// Queue name, e.g. `email`
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    /// Default number of attempts per job
    #[serde(default = "default_attempts")]
    #[validate(range(min = 1, max = 100))]
    pub attempts: u32,

    /// Default backoff policy
    #[serde(default = "default_backoff")]
    pub backoff: Backoff,

    /// Default priority (higher runs sooner)
    #[serde(default)]
    pub priority: i32,

    /// Completed jobs retained before pruning
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,

    /// Failed jobs retained before pruning
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,

    /// Handler run time after which a job counts as stalled (0 disables)
    #[serde(default = "default_stalled_interval_ms")]
    pub stalled_interval_ms: u64,

    /// Stalls tolerated before the job is failed
    #[serde(default = "default_max_stalled_count")]
    pub max_stalled_count: u32,
}

impl QueueSettings {
    /// Settings for `name` with every other field at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: default_attempts(),
            backoff: default_backoff(),
            priority: 0,
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            stalled_interval_ms: default_stalled_interval_ms(),
            max_stalled_count: default_max_stalled_count(),
        }
    }

    /// Convert to the runtime queue configuration
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            name: self.name.clone(),
            default_job_options: DefaultJobOptions {
                attempts: self.attempts,
                backoff: self.backoff,
                priority: self.priority,
                keep_completed: self.keep_completed,
                keep_failed: self.keep_failed,
            },
            stalled_interval_ms: self.stalled_interval_ms,
            max_stalled_count: self.max_stalled_count,
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application information
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Queues provisioned at startup
    #[serde(default)]
    pub queues: Vec<QueueSettings>,
}
