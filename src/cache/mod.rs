//! Multi-tier cache with pattern-based invalidation.
//!
//! Three tiers sit behind one [`CacheOrchestrator`]:
//! - hot: small in-process LRU for the most frequently read keys
//! - query: in-process LRU sized for query-shaped payloads
//! - cold: the distributed store (Redis, or memory for development)
//!
//! # Configuration
//!
//! ```toml
//! [cache]
//! default_ttl = 3600
//! refresh_ahead_threshold = 0.8
//!
//! [cache.hot]
//! max_entries = 1000
//!
//! [cache.cold]
//! backend = "redis"
//! retry_attempts = 3
//! retry_delay_ms = 100
//!
//! [cache.cold.redis]
//! url = "redis://127.0.0.1:6379"
//! fallback_url = "redis://127.0.0.1:6380"
//!
//! [[cache.invalidation.rules]]
//! source = "user:*"
//! dependents = ["dashboard:stats"]
//! ```
//!
//! # Usage
//!
//! Use the `#[cached]` attribute to cache async functions:
//!
//! ```ignore
//! #[cached(name = "room_info", ttl = 60, key = room_id)]
//! async fn room_info(cache: &CacheOrchestrator, room_id: &str) -> AppResult<RoomInfo> {
//!     provider.get_room_info(room_id).await
//! }
//! ```

pub(crate) mod cold;
mod error;
mod invalidation;
mod memory;
mod orchestrator;
mod pattern;
mod redis;
mod stats;
mod strategy;
mod traits;
mod types;

pub use cold::{ColdState, ColdTier};
pub use error::CacheError;
pub use invalidation::{InvalidationRegistry, InvalidationRule};
pub use macros::cached;
pub use memory::MemoryCache;
pub use orchestrator::{
    CacheOrchestrator, CacheOrchestratorBuilder, DEFAULT_REFRESH_AHEAD_THRESHOLD,
    DEFAULT_TTL_SECONDS,
};
pub use pattern::KeyPattern;
pub use self::redis::RedisCache;
pub use stats::{CacheStats, CacheStatsSnapshot, TierStats};
pub use traits::AppCache;
pub use types::{CacheEntry, Tier, TierOptions};
