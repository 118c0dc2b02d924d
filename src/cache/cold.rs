//! Cold tier: the distributed store with a single-node fallback.
//!
//! The tier is a small state machine:
//!
//! ```text
//! Connected --(primary fails after retries)--> Degraded
//! Degraded  --(check_health: primary answers)--> Connected
//! ```
//!
//! While degraded every call goes to the fallback node. A transport failure
//! on the fallback surfaces as [`CacheError::Unavailable`].
//!
//! Keys written or removed while degraded, and patterns invalidated, are
//! remembered. Before switching back, `check_health` deletes them from the
//! primary so it cannot serve values invalidated during the outage.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{AppCache, CacheError, KeyPattern, MemoryCache, RedisCache};
use crate::config::{ColdBackend, ColdTierConfig};

/// Connection state of the cold tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColdState {
    Connected,
    Degraded,
}

impl ColdState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ColdState::Connected,
            _ => ColdState::Degraded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ColdState::Connected => 0,
            ColdState::Degraded => 1,
        }
    }
}

/// Past this many tracked keys a recovery clears the primary instead.
const MAX_TRACKED_KEYS: usize = 10_000;

/// What the fallback saw that the primary did not.
#[derive(Default)]
struct Divergence {
    keys: HashSet<String>,
    patterns: Vec<KeyPattern>,
    cleared: bool,
}

impl Divergence {
    fn is_empty(&self) -> bool {
        !self.cleared && self.keys.is_empty() && self.patterns.is_empty()
    }

    fn add_key(&mut self, key: &str) {
        if self.cleared {
            return;
        }
        self.keys.insert(key.to_string());
        if self.keys.len() > MAX_TRACKED_KEYS {
            self.mark_cleared();
        }
    }

    fn add_pattern(&mut self, pattern: &KeyPattern) {
        if !self.cleared && self.patterns.iter().all(|p| p.as_str() != pattern.as_str()) {
            self.patterns.push(pattern.clone());
        }
    }

    fn mark_cleared(&mut self) {
        self.cleared = true;
        self.keys.clear();
        self.patterns.clear();
    }

    fn absorb(&mut self, other: Divergence) {
        if other.cleared {
            self.mark_cleared();
            return;
        }
        for key in &other.keys {
            self.add_key(key);
        }
        for pattern in &other.patterns {
            self.add_pattern(pattern);
        }
    }
}

pub struct ColdTier {
    primary: Arc<dyn AppCache>,
    fallback: Arc<dyn AppCache>,
    state: AtomicU8,
    divergence: Mutex<Divergence>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ColdTier {
    pub fn new(
        primary: Arc<dyn AppCache>,
        fallback: Arc<dyn AppCache>,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            state: AtomicU8::new(ColdState::Connected.as_u8()),
            divergence: Mutex::new(Divergence::default()),
            retry_attempts: retry_attempts.max(1),
            retry_delay,
        }
    }

    /// Memory-backed tier, for development and tests.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(
            Arc::new(MemoryCache::new(max_entries)),
            Arc::new(MemoryCache::new(max_entries)),
            1,
            Duration::ZERO,
        )
    }

    /// Build the configured backend.
    pub async fn from_config(config: &ColdTierConfig) -> Result<Self, CacheError> {
        let (primary, fallback): (Arc<dyn AppCache>, Arc<dyn AppCache>) = match config.backend {
            ColdBackend::Memory => (
                Arc::new(MemoryCache::new(config.memory_max_entries)),
                Arc::new(MemoryCache::new(config.memory_max_entries)),
            ),
            ColdBackend::Redis => (
                Arc::new(RedisCache::primary(&config.redis).await?),
                Arc::new(RedisCache::fallback(&config.redis).await?),
            ),
        };

        info!(
            backend = ?config.backend,
            retry_attempts = config.retry_attempts,
            retry_delay_ms = config.retry_delay_ms,
            "Cold tier initialized"
        );

        Ok(Self::new(
            primary,
            fallback,
            config.retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        ))
    }

    pub fn state(&self) -> ColdState {
        ColdState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ColdState) -> ColdState {
        ColdState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel))
    }

    /// Ping the primary and move between states accordingly.
    ///
    /// Leaving degraded mode first deletes from the primary every key that
    /// changed on the fallback meanwhile. If that fails the tier stays
    /// degraded. Returns whether the tier is back on the primary.
    pub async fn check_health(&self) -> bool {
        if let Err(e) = self.primary.ping().await {
            if self.set_state(ColdState::Degraded) == ColdState::Connected {
                warn!(error = %e, "Cold tier primary unreachable, switching to fallback");
            }
            return false;
        }
        if self.state() == ColdState::Connected {
            return true;
        }

        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Cold tier primary answered but could not be reconciled");
            return false;
        }
        self.set_state(ColdState::Connected);
        info!("Cold tier primary reachable again, leaving degraded mode");

        // writes that raced the switch
        if let Err(e) = self.reconcile().await {
            error!(error = %e, "Cold tier reconciliation after recovery failed");
        }
        true
    }

    fn divergence(&self) -> MutexGuard<'_, Divergence> {
        self.divergence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a change that only the fallback saw.
    fn track(&self, f: impl FnOnce(&mut Divergence)) {
        if self.state() == ColdState::Degraded {
            f(&mut self.divergence());
        }
    }

    async fn reconcile(&self) -> Result<(), CacheError> {
        let pending = std::mem::take(&mut *self.divergence());
        if pending.is_empty() {
            return Ok(());
        }

        match self.purge_from_primary(&pending).await {
            Ok(()) => {
                info!(
                    keys = pending.keys.len(),
                    patterns = pending.patterns.len(),
                    cleared = pending.cleared,
                    "Purged keys changed during degraded mode from cold primary"
                );
                Ok(())
            }
            Err(e) => {
                self.divergence().absorb(pending);
                Err(e)
            }
        }
    }

    async fn purge_from_primary(&self, pending: &Divergence) -> Result<(), CacheError> {
        if pending.cleared {
            return self.primary.clear().await;
        }
        for pattern in &pending.patterns {
            for key in self.primary.keys_matching(pattern).await? {
                self.primary.remove(&key).await?;
            }
        }
        for key in &pending.keys {
            self.primary.remove(key).await?;
        }
        Ok(())
    }

    async fn with_retries<T, F, Fut>(&self, store: &Arc<dyn AppCache>, f: &F) -> Result<T, CacheError>
    where
        F: Fn(Arc<dyn AppCache>) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut attempt = 1;
        loop {
            match f(Arc::clone(store)).await {
                Err(e) if e.is_transport() && attempt < self.retry_attempts => {
                    debug!(attempt, error = %e, "Cold tier call failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: Fn(Arc<dyn AppCache>) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        if self.state() == ColdState::Connected {
            match self.with_retries(&self.primary, &f).await {
                Err(e) if e.is_transport() => {
                    if self.set_state(ColdState::Degraded) == ColdState::Connected {
                        warn!(op, error = %e, "Cold tier primary failed, switching to fallback");
                    }
                }
                result => return result,
            }
        }

        match self.with_retries(&self.fallback, &f).await {
            Err(e) if e.is_transport() => {
                warn!(op, error = %e, "Cold tier fallback failed");
                Err(CacheError::Unavailable(format!("{}: {}", op, e)))
            }
            result => result,
        }
    }
}

#[async_trait]
impl AppCache for ColdTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.call("get", |store| async move { store.get(key).await })
            .await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        self.call("get_many", |store| async move { store.get_many(keys).await })
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError> {
        let result = self
            .call("set", |store| {
                let value = value.clone();
                async move { store.set(key, value, ttl_seconds).await }
            })
            .await;
        self.track(|d| d.add_key(key));
        result
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl_seconds: u64) -> Result<(), CacheError> {
        let result = self
            .call("set_many", |store| async move {
                store.set_many(entries, ttl_seconds).await
            })
            .await;
        self.track(|d| entries.iter().for_each(|(key, _)| d.add_key(key)));
        result
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let result = self
            .call("remove", |store| async move { store.remove(key).await })
            .await;
        self.track(|d| d.add_key(key));
        result
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.call("remaining_ttl", |store| async move {
            store.remaining_ttl(key).await
        })
        .await
    }

    /// Only invalidation scans by pattern, so a degraded scan marks the
    /// pattern for purging on the primary.
    async fn keys_matching(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        let result = self
            .call("keys_matching", |store| async move {
                store.keys_matching(pattern).await
            })
            .await;
        self.track(|d| d.add_pattern(pattern));
        result
    }

    async fn len(&self) -> Result<Option<usize>, CacheError> {
        self.call("len", |store| async move { store.len().await })
            .await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let result = self
            .call("clear", |store| async move { store.clear().await })
            .await;
        self.track(Divergence::mark_cleared);
        result
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.call("ping", |store| async move { store.ping().await })
            .await
    }
}
