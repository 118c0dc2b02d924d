//! Settings for the cache tiers, queues and logger.
//!
//! See [`loader`] for how files and `TIERCACHE_*` variables are layered.

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::{ConfigLoader, Layer};
pub use settings::{
    CacheSettings, ColdBackend, ColdTierConfig, InvalidationRuleConfig, InvalidationSettings,
    LoggerSettings, MemoryTierConfig, QueueSettings, RedisCacheConfig, Settings,
};
