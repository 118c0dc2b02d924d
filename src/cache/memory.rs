//! In-process LRU tier with per-entry TTL, backed by `cached::SizedCache`.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cached::{Cached, SizedCache};
use tokio::time::Instant;

use crate::cache::{AppCache, CacheError, KeyPattern};

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl_seconds: u64) -> Self {
        let expires_at = match ttl_seconds {
            0 => None,
            // past what `Instant` can hold, which is as good as never
            secs => Instant::now().checked_add(Duration::from_secs(secs)),
        };
        Self { value, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Bounded in-memory cache.
///
/// Least recently used entries are evicted once `max_entries` is exceeded.
/// Expired entries are dropped lazily on read and by [`MemoryCache::purge_expired`].
pub struct MemoryCache {
    store: Mutex<SizedCache<String, Entry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            store: Mutex::new(SizedCache::with_size(max_entries)),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SizedCache<String, Entry>>, CacheError> {
        self.store
            .lock()
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    /// Look up a live entry, removing it if it has expired.
    fn live_entry(store: &mut SizedCache<String, Entry>, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let expired = match store.cache_get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            store.cache_remove(key);
        }
        None
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut store = self.lock()?;
        let now = Instant::now();
        let expired: Vec<String> = store
            .key_order()
            .zip(store.value_order())
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.cache_remove(key);
        }
        Ok(expired.len())
    }

    /// Number of live entries.
    pub fn size(&self) -> Result<usize, CacheError> {
        self.purge_expired()?;
        Ok(self.lock()?.cache_size())
    }
}

#[async_trait]
impl AppCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut store = self.lock()?;
        Ok(Self::live_entry(&mut store, key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut store = self.lock()?;
        store.cache_set(key.to_string(), Entry::new(value, ttl_seconds));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.lock()?;
        store.cache_remove(key);
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut store = self.lock()?;
        let now = Instant::now();
        Ok(Self::live_entry(&mut store, key)
            .and_then(|entry| entry.expires_at)
            .map(|exp| exp.saturating_duration_since(now)))
    }

    async fn keys_matching(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        let store = self.lock()?;
        let now = Instant::now();
        Ok(store
            .key_order()
            .zip(store.value_order())
            .filter(|(key, entry)| !entry.is_expired(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn len(&self) -> Result<Option<usize>, CacheError> {
        self.size().map(Some)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.lock()?;
        store.cache_clear();
        Ok(())
    }
}
