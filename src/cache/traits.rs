//! AppCache trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheError, KeyPattern};

/// Trait for a single cache tier.
///
/// All tier backends implement this so the orchestrator never depends on a
/// concrete store. TTLs are in seconds and `0` means the entry never expires.
#[async_trait]
pub trait AppCache: Send + Sync {
    /// Get a value from the cache. Expired entries are a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Get several values, in key order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Set a value, overwriting any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Set several values with the same TTL.
    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl_seconds: u64) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.set(key, value.clone(), ttl_seconds).await?;
        }
        Ok(())
    }

    /// Remove a value from the cache.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Time left before `key` expires. `None` when the key is missing or has
    /// no expiry.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Keys currently stored that match `pattern`.
    async fn keys_matching(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError>;

    /// Number of live entries, where the backend can tell cheaply.
    async fn len(&self) -> Result<Option<usize>, CacheError> {
        Ok(None)
    }

    /// Clear all values from the cache.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
