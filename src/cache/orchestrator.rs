//! Tiered cache orchestrator.
//!
//! Reads probe Hot → Query → Cold and promote a colder hit into every warmer
//! tier that was probed. Writes go to the cold tier first; a cold failure
//! fails the call while warm-tier failures are only logged. Every write or
//! delete then runs the invalidation cascade.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cache::types::ttl_secs_ceil;
use crate::cache::{
    AppCache, CacheEntry, CacheError, CacheStats, CacheStatsSnapshot, ColdState, ColdTier,
    InvalidationRegistry, KeyPattern, MemoryCache, Tier, TierOptions,
};
use crate::config::CacheSettings;

pub const DEFAULT_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_REFRESH_AHEAD_THRESHOLD: f64 = 0.8;

type Probed<'a> = Vec<(Tier, &'a MemoryCache)>;

pub(crate) struct Inner {
    pub(crate) hot: Option<MemoryCache>,
    pub(crate) query: Option<MemoryCache>,
    pub(crate) cold: Option<ColdTier>,
    registry: InvalidationRegistry,
    stats: CacheStats,
    default_ttl: u64,
    pub(crate) refresh_ahead_threshold: f64,
    pub(crate) tasks: TaskTracker,
    pub(crate) refreshing: DashSet<String>,
}

/// Multi-tier cache front end. Cheap to clone; clones share tiers, counters
/// and background tasks.
#[derive(Clone)]
pub struct CacheOrchestrator {
    pub(crate) inner: Arc<Inner>,
}

pub struct CacheOrchestratorBuilder {
    hot: Option<MemoryCache>,
    query: Option<MemoryCache>,
    cold: Option<ColdTier>,
    registry: InvalidationRegistry,
    default_ttl: u64,
    refresh_ahead_threshold: f64,
}

impl CacheOrchestratorBuilder {
    pub fn hot(mut self, max_entries: usize) -> Self {
        self.hot = Some(MemoryCache::new(max_entries));
        self
    }

    pub fn query(mut self, max_entries: usize) -> Self {
        self.query = Some(MemoryCache::new(max_entries));
        self
    }

    pub fn cold(mut self, cold: ColdTier) -> Self {
        self.cold = Some(cold);
        self
    }

    pub fn invalidation(mut self, registry: InvalidationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn default_ttl(mut self, ttl_seconds: u64) -> Self {
        self.default_ttl = ttl_seconds;
        self
    }

    pub fn refresh_ahead_threshold(mut self, threshold: f64) -> Self {
        self.refresh_ahead_threshold = threshold;
        self
    }

    pub fn build(self) -> CacheOrchestrator {
        CacheOrchestrator {
            inner: Arc::new(Inner {
                hot: self.hot,
                query: self.query,
                cold: self.cold,
                registry: self.registry,
                stats: CacheStats::default(),
                default_ttl: self.default_ttl,
                refresh_ahead_threshold: self.refresh_ahead_threshold,
                tasks: TaskTracker::new(),
                refreshing: DashSet::new(),
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl CacheOrchestrator {
    pub fn builder() -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder {
            hot: None,
            query: None,
            cold: None,
            registry: InvalidationRegistry::default(),
            default_ttl: DEFAULT_TTL_SECONDS,
            refresh_ahead_threshold: DEFAULT_REFRESH_AHEAD_THRESHOLD,
        }
    }

    /// Build every enabled tier from configuration.
    pub async fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let mut builder = Self::builder()
            .default_ttl(settings.default_ttl)
            .refresh_ahead_threshold(settings.refresh_ahead_threshold)
            .invalidation(InvalidationRegistry::from_settings(&settings.invalidation)?);

        if settings.hot.enabled {
            builder = builder.hot(settings.hot.max_entries);
        }
        if settings.query.enabled {
            builder = builder.query(settings.query.max_entries);
        }
        if settings.cold.enabled {
            builder = builder.cold(ColdTier::from_config(&settings.cold).await?);
        }

        let orchestrator = builder.build();
        info!(
            hot = settings.hot.enabled,
            query = settings.query.enabled,
            cold = settings.cold.enabled,
            rules = orchestrator.inner.registry.rules().len(),
            "Cache orchestrator initialized"
        );
        Ok(orchestrator)
    }

    fn warm(&self, options: TierOptions) -> impl Iterator<Item = (Tier, &MemoryCache)> + '_ {
        [
            (Tier::Hot, self.inner.hot.as_ref()),
            (Tier::Query, self.inner.query.as_ref()),
        ]
        .into_iter()
        .filter(move |(tier, _)| options.uses(*tier))
        .filter_map(|(tier, store)| store.map(|s| (tier, s)))
    }

    fn cold(&self, options: TierOptions) -> Option<&ColdTier> {
        self.inner.cold.as_ref().filter(|_| options.use_cold)
    }

    pub(crate) fn resolve_ttl(&self, ttl_seconds: Option<u64>, options: TierOptions) -> u64 {
        ttl_seconds
            .or(options.ttl)
            .unwrap_or(self.inner.default_ttl)
    }

    /// Read a value, probing tiers from warmest to coldest.
    ///
    /// A cold tier that cannot be reached yields `CacheError::Unavailable`,
    /// which is not the same as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        options: TierOptions,
    ) -> Result<Option<T>, CacheError> {
        Ok(self.get_entry(key, options).await?.map(|entry| entry.value))
    }

    /// Like [`CacheOrchestrator::get`], also reporting which tier answered.
    pub async fn get_entry<T: DeserializeOwned>(
        &self,
        key: &str,
        options: TierOptions,
    ) -> Result<Option<CacheEntry<T>>, CacheError> {
        let mut probed: Probed<'_> = Vec::new();

        for (tier, store) in self.warm(options) {
            match store.get(key).await {
                Ok(Some(bytes)) => {
                    let remaining = store.remaining_ttl(key).await.ok().flatten();
                    return Ok(self
                        .found(key, tier, bytes, remaining, &probed, options)
                        .await);
                }
                Ok(None) => {}
                Err(e) => warn!(key, tier = %tier, error = %e, "Warm tier read failed"),
            }
            self.inner.stats.record_miss(tier);
            probed.push((tier, store));
        }

        if let Some(cold) = self.cold(options) {
            match cold.get(key).await {
                Ok(Some(bytes)) => {
                    let remaining = cold.remaining_ttl(key).await.unwrap_or_else(|e| {
                        warn!(key, error = %e, "Could not read cold tier TTL");
                        None
                    });
                    return Ok(self
                        .found(key, Tier::Cold, bytes, remaining, &probed, options)
                        .await);
                }
                Ok(None) => self.inner.stats.record_miss(Tier::Cold),
                Err(e) => {
                    self.inner.stats.record_miss(Tier::Cold);
                    return Err(e);
                }
            }
        }

        Ok(None)
    }

    /// Decode a hit and promote it into the tiers probed before it.
    ///
    /// An entry that no longer decodes is purged from every tier and reported
    /// as a miss.
    async fn found<T: DeserializeOwned>(
        &self,
        key: &str,
        tier: Tier,
        bytes: Vec<u8>,
        remaining: Option<Duration>,
        probed: &[(Tier, &MemoryCache)],
        options: TierOptions,
    ) -> Option<CacheEntry<T>> {
        let value = match decode::<T>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, tier = %tier, error = %e, "Purging undecodable cache entry");
                self.inner.stats.record_miss(tier);
                self.remove_everywhere(key).await;
                return None;
            }
        };
        self.inner.stats.record_hit(tier);

        if !probed.is_empty() {
            let ttl = remaining
                .map(ttl_secs_ceil)
                .unwrap_or_else(|| self.resolve_ttl(None, options));
            for (warmer, store) in probed {
                if let Err(e) = store.set(key, bytes.clone(), ttl).await {
                    warn!(key, tier = %warmer, error = %e, "Backfill failed");
                }
            }
            debug!(key, from = %tier, ttl, "Backfilled warmer tiers");
        }

        Some(CacheEntry {
            key: key.to_string(),
            value,
            ttl_seconds: remaining.map(ttl_secs_ceil).unwrap_or(0),
            tier,
            remaining,
        })
    }

    /// Write a value to every enabled tier, then run the invalidation cascade.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
        options: TierOptions,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        let ttl = self.resolve_ttl(ttl_seconds, options);

        if let Some(cold) = self.cold(options) {
            cold.set(key, bytes.clone(), ttl).await?;
        }
        for (tier, store) in self.warm(options) {
            if let Err(e) = store.set(key, bytes.clone(), ttl).await {
                warn!(key, tier = %tier, error = %e, "Warm tier write failed");
            }
        }

        self.cascade(key).await;
        Ok(())
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// There is no single-flight: callers that miss concurrently each run
    /// `compute`. Cache failures never fail the call.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        compute: F,
        ttl_seconds: Option<u64>,
        options: TierOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key, options).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Cache read failed, treating as miss"),
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value, ttl_seconds, options).await {
            warn!(key, error = %e, "Failed to store computed value");
        }
        Ok(value)
    }

    /// Read several keys. Warm tiers are probed per key; whatever is still
    /// missing is fetched from the cold tier in one batch.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[String],
        options: TierOptions,
    ) -> Result<Vec<Option<T>>, CacheError> {
        let mut results: Vec<Option<T>> = keys.iter().map(|_| None).collect();
        let mut pending: Vec<(usize, Probed<'_>)> = Vec::new();

        'keys: for (i, key) in keys.iter().enumerate() {
            let mut probed: Probed<'_> = Vec::new();
            for (tier, store) in self.warm(options) {
                match store.get(key).await {
                    Ok(Some(bytes)) => {
                        let remaining = store.remaining_ttl(key).await.ok().flatten();
                        results[i] = self
                            .found(key, tier, bytes, remaining, &probed, options)
                            .await
                            .map(|entry| entry.value);
                        continue 'keys;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(key, tier = %tier, error = %e, "Warm tier read failed"),
                }
                self.inner.stats.record_miss(tier);
                probed.push((tier, store));
            }
            pending.push((i, probed));
        }

        let Some(cold) = self.cold(options) else {
            return Ok(results);
        };
        if pending.is_empty() {
            return Ok(results);
        }

        let cold_keys: Vec<String> = pending.iter().map(|(i, _)| keys[*i].clone()).collect();
        let values = match cold.get_many(&cold_keys).await {
            Ok(values) => values,
            Err(e) => {
                for _ in &pending {
                    self.inner.stats.record_miss(Tier::Cold);
                }
                return Err(e);
            }
        };

        for ((i, probed), bytes) in pending.iter().zip(values) {
            let key = &keys[*i];
            match bytes {
                Some(bytes) => {
                    let remaining = cold.remaining_ttl(key).await.ok().flatten();
                    results[*i] = self
                        .found(key, Tier::Cold, bytes, remaining, probed, options)
                        .await
                        .map(|entry| entry.value);
                }
                None => self.inner.stats.record_miss(Tier::Cold),
            }
        }

        Ok(results)
    }

    /// Write several entries with one TTL, then cascade for each key.
    pub async fn mset<T: Serialize>(
        &self,
        entries: &[(String, T)],
        ttl_seconds: Option<u64>,
        options: TierOptions,
    ) -> Result<(), CacheError> {
        let encoded = entries
            .iter()
            .map(|(key, value)| -> Result<(String, Vec<u8>), CacheError> {
                Ok((key.clone(), serde_json::to_vec(value)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ttl = self.resolve_ttl(ttl_seconds, options);

        if let Some(cold) = self.cold(options) {
            cold.set_many(&encoded, ttl).await?;
        }
        for (tier, store) in self.warm(options) {
            if let Err(e) = store.set_many(&encoded, ttl).await {
                warn!(tier = %tier, count = encoded.len(), error = %e, "Warm tier batch write failed");
            }
        }

        for (key, _) in &encoded {
            self.cascade(key).await;
        }
        Ok(())
    }

    /// Remove a key from the selected tiers, then cascade.
    pub async fn del(&self, key: &str, options: TierOptions) -> Result<(), CacheError> {
        for (tier, store) in self.warm(options) {
            if let Err(e) = store.remove(key).await {
                warn!(key, tier = %tier, error = %e, "Warm tier delete failed");
            }
        }
        let cold_result = match self.cold(options) {
            Some(cold) => cold.remove(key).await,
            None => Ok(()),
        };

        self.cascade(key).await;
        cold_result
    }

    /// Delete every key matching `pattern` in every tier, cascading from each.
    /// Returns the number of distinct keys removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let pattern = KeyPattern::compile(pattern)?;

        let mut keys = BTreeSet::new();
        for (tier, store) in self.warm(TierOptions::default()) {
            match store.keys_matching(&pattern).await {
                Ok(found) => keys.extend(found),
                Err(e) => warn!(pattern = %pattern, tier = %tier, error = %e, "Warm tier scan failed"),
            }
        }
        if let Some(cold) = &self.inner.cold {
            keys.extend(cold.keys_matching(&pattern).await?);
        }

        for key in &keys {
            self.remove_everywhere(key).await;
        }
        for key in &keys {
            self.cascade(key).await;
        }

        info!(pattern = %pattern, removed = keys.len(), "Invalidated pattern");
        Ok(keys.len())
    }

    /// Flush every tier.
    pub async fn clear(&self) -> Result<(), CacheError> {
        for (_, store) in self.warm(TierOptions::default()) {
            store.clear().await?;
        }
        if let Some(cold) = &self.inner.cold {
            cold.clear().await?;
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Sweep expired entries out of the in-process tiers.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut purged = 0;
        for (_, store) in self.warm(TierOptions::default()) {
            purged += store.purge_expired()?;
        }
        if purged > 0 {
            debug!(purged, "Purged expired warm entries");
        }
        Ok(purged)
    }

    /// Wait for write-behind and refresh-ahead tasks to finish.
    pub async fn close(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// State of the cold tier, `None` when it is disabled.
    pub fn cold_state(&self) -> Option<ColdState> {
        self.inner.cold.as_ref().map(ColdTier::state)
    }

    /// Probe the cold tier, letting it leave or enter degraded mode.
    /// Without a cold tier there is nothing to be disconnected from.
    pub async fn check_health(&self) -> bool {
        match &self.inner.cold {
            Some(cold) => cold.check_health().await,
            None => true,
        }
    }

    /// Live entry counts of the in-process tiers.
    pub fn warm_sizes(&self) -> Vec<(Tier, usize)> {
        self.warm(TierOptions::default())
            .filter_map(|(tier, store)| store.size().ok().map(|n| (tier, n)))
            .collect()
    }

    async fn remove_everywhere(&self, key: &str) {
        for (tier, store) in self.warm(TierOptions::default()) {
            if let Err(e) = store.remove(key).await {
                warn!(key, tier = %tier, error = %e, "Warm tier delete failed");
            }
        }
        if let Some(cold) = &self.inner.cold {
            if let Err(e) = cold.remove(key).await {
                warn!(key, error = %e, "Cold tier delete failed");
            }
        }
    }

    /// Concrete keys a dependent pattern currently names. Literals are taken
    /// as-is; wildcards are resolved by scanning every tier.
    async fn resolve(&self, pattern: &KeyPattern) -> BTreeSet<String> {
        if pattern.is_literal() {
            return BTreeSet::from([pattern.as_str().to_string()]);
        }

        let mut keys = BTreeSet::new();
        for (tier, store) in self.warm(TierOptions::default()) {
            match store.keys_matching(pattern).await {
                Ok(found) => keys.extend(found),
                Err(e) => warn!(pattern = %pattern, tier = %tier, error = %e, "Warm tier scan failed"),
            }
        }
        if let Some(cold) = &self.inner.cold {
            match cold.keys_matching(pattern).await {
                Ok(found) => keys.extend(found),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Cold tier scan failed, continuing cascade")
                }
            }
        }
        keys
    }

    /// Delete the dependents of `key`, following chains up to the registry's
    /// `max_depth`. Each key is removed at most once per cascade.
    async fn cascade(&self, key: &str) {
        let registry = &self.inner.registry;
        if registry.is_empty() {
            return;
        }

        let mut visited = HashSet::from([key.to_string()]);
        let mut frontier = vec![key.to_string()];

        for depth in 1..=registry.max_depth() {
            let mut next = Vec::new();
            for source in &frontier {
                for pattern in registry.dependents_of(source) {
                    for dependent in self.resolve(pattern).await {
                        if !visited.insert(dependent.clone()) {
                            continue;
                        }
                        self.remove_everywhere(&dependent).await;
                        debug!(source = %source, dependent = %dependent, depth, "Invalidated dependent key");
                        next.push(dependent);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::cache::cold::tests::FlakyStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
    }

    fn ana() -> User {
        User {
            name: "Ana".to_string(),
        }
    }

    fn orchestrator(registry: InvalidationRegistry) -> CacheOrchestrator {
        CacheOrchestrator::builder()
            .hot(100)
            .query(100)
            .cold(ColdTier::in_memory(1000))
            .invalidation(registry)
            .build()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = orchestrator(InvalidationRegistry::new());
        cache
            .set("user:42", &ana(), Some(3600), TierOptions::default())
            .await
            .unwrap();

        let entry = cache
            .get_entry::<User>("user:42", TierOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.value, ana());
        assert_eq!(entry.tier, Tier::Hot);
        assert_eq!(entry.ttl_seconds, 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_hit_backfills_with_remaining_ttl() {
        let cache = orchestrator(InvalidationRegistry::new());
        cache
            .set("user:42", &ana(), Some(100), TierOptions::cold_only())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;

        let entry = cache
            .get_entry::<User>("user:42", TierOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.tier, Tier::Cold);

        let entry = cache
            .get_entry::<User>("user:42", TierOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.tier, Tier::Hot);
        assert_eq!(entry.ttl_seconds, 60);

        let stats = cache.stats();
        assert_eq!(stats.hot.hits, 1);
        assert_eq!(stats.hot.misses, 1);
        assert_eq!(stats.query.misses, 1);
        assert_eq!(stats.cold.hits, 1);
    }

    #[tokio::test]
    async fn test_backfill_only_probed_tiers() {
        let cache = orchestrator(InvalidationRegistry::new());
        cache
            .set("k", &1u32, Some(60), TierOptions::cold_only())
            .await
            .unwrap();

        let opts = TierOptions {
            use_hot: false,
            ..TierOptions::default()
        };
        assert_eq!(cache.get::<u32>("k", opts).await.unwrap(), Some(1));

        let hot = cache.inner.hot.as_ref().unwrap();
        let query = cache.inner.query.as_ref().unwrap();
        assert_eq!(hot.get("k").await.unwrap(), None);
        assert!(query.get("k").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_across_tiers() {
        let cache = orchestrator(InvalidationRegistry::new());
        cache
            .set("session", &"abc", Some(2), TierOptions::default())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(
            cache.get::<String>("session", TierOptions::default()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_purged() {
        let cache = orchestrator(InvalidationRegistry::new());
        let hot = cache.inner.hot.as_ref().unwrap();
        hot.set("broken", b"not json".to_vec(), 0).await.unwrap();

        assert_eq!(
            cache.get::<User>("broken", TierOptions::default()).await.unwrap(),
            None
        );
        assert_eq!(hot.get("broken").await.unwrap(), None);
        assert_eq!(cache.stats().hot.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_unavailable_is_not_a_miss() {
        let primary = FlakyStore::new();
        let fallback = FlakyStore::new();
        primary.set_down(true);
        fallback.set_down(true);
        let cache = CacheOrchestrator::builder()
            .hot(10)
            .cold(ColdTier::new(primary, fallback, 2, Duration::from_millis(10)))
            .build();

        let err = cache
            .get::<u32>("k", TierOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));

        let err = cache
            .set("k", &1u32, None, TierOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));

        // get_or_set still produces a value
        let value: Result<u32, CacheError> = cache
            .get_or_set("k", || async { Ok(7) }, None, TierOptions::default())
            .await;
        assert_eq!(value.unwrap(), 7);
        assert_eq!(cache.cold_state(), Some(ColdState::Degraded));
    }

    #[tokio::test]
    async fn test_get_or_set_computes_once_sequentially() {
        let cache = orchestrator(InvalidationRegistry::new());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, CacheError> = cache
                .get_or_set(
                    "answer",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(42)
                    },
                    Some(60),
                    TierOptions::default(),
                )
                .await;
            assert_eq!(value.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_compute_error_is_not_cached() {
        let cache = orchestrator(InvalidationRegistry::new());
        let result: Result<u32, String> = cache
            .get_or_set("k", || async { Err("boom".to_string()) }, None, TierOptions::default())
            .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(cache.get::<u32>("k", TierOptions::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_invalidates_literal_dependent() {
        let registry = InvalidationRegistry::new()
            .with_rule("user:*", &["dashboard:stats"])
            .unwrap();
        let cache = orchestrator(registry);
        let opts = TierOptions::default();

        cache.set("dashboard:stats", &10u32, None, opts).await.unwrap();
        cache.set("user:42", &ana(), Some(3600), opts).await.unwrap();

        assert_eq!(cache.get::<u32>("dashboard:stats", opts).await.unwrap(), None);
        assert_eq!(cache.get::<User>("user:42", opts).await.unwrap(), Some(ana()));
    }

    #[tokio::test]
    async fn test_wildcard_dependents_cleared_in_every_tier() {
        let registry = InvalidationRegistry::new()
            .with_rule("product:*", &["catalog:*"])
            .unwrap();
        let cache = orchestrator(registry);
        let opts = TierOptions::default();

        cache.set("catalog:page:1", &1u32, None, opts).await.unwrap();
        cache
            .set("catalog:page:2", &2u32, None, TierOptions::cold_only())
            .await
            .unwrap();
        cache.set("unrelated", &3u32, None, opts).await.unwrap();

        cache.set("product:7", &"widget", None, opts).await.unwrap();

        for key in ["catalog:page:1", "catalog:page:2"] {
            assert_eq!(cache.get::<u32>(key, opts).await.unwrap(), None, "{}", key);
        }
        assert_eq!(cache.get::<u32>("unrelated", opts).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_cascade_is_single_hop_by_default() {
        let registry = InvalidationRegistry::new()
            .with_rule("a", &["b"])
            .unwrap()
            .with_rule("b", &["c"])
            .unwrap();
        let cache = orchestrator(registry);
        let opts = TierOptions::warm_only();

        cache.set("c", &3u32, None, opts).await.unwrap();
        cache.set("b", &2u32, None, opts).await.unwrap();
        assert_eq!(cache.get::<u32>("c", opts).await.unwrap(), None);

        cache.set("c", &3u32, None, opts).await.unwrap();
        cache.set("a", &1u32, None, opts).await.unwrap();
        assert_eq!(cache.get::<u32>("b", opts).await.unwrap(), None);
        assert_eq!(cache.get::<u32>("c", opts).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_cascade_chains_with_depth_and_stops_on_cycles() {
        let registry = InvalidationRegistry::new()
            .with_rule("a", &["b"])
            .unwrap()
            .with_rule("b", &["c"])
            .unwrap()
            .with_rule("c", &["a"])
            .unwrap()
            .with_max_depth(5);
        let cache = orchestrator(registry);
        let opts = TierOptions::warm_only();

        // writing "c" last leaves only "c" behind
        cache.set("b", &2u32, None, opts).await.unwrap();
        cache.set("c", &3u32, None, opts).await.unwrap();
        assert_eq!(cache.get::<u32>("b", opts).await.unwrap(), None);

        cache.set("b", &2u32, None, TierOptions::cold_only()).await.unwrap();
        cache.set("a", &1u32, None, opts).await.unwrap();
        assert_eq!(cache.get::<u32>("a", opts).await.unwrap(), Some(1));
        assert_eq!(cache.get::<u32>("b", TierOptions::default()).await.unwrap(), None);
        assert_eq!(cache.get::<u32>("c", opts).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_removes_everywhere_and_cascades() {
        let registry = InvalidationRegistry::new()
            .with_rule("user:*", &["dashboard:stats"])
            .unwrap();
        let cache = orchestrator(registry);
        let opts = TierOptions::default();

        cache.set("user:1", &ana(), None, opts).await.unwrap();
        cache.set("dashboard:stats", &5u32, None, opts).await.unwrap();
        cache.del("user:1", opts).await.unwrap();

        assert_eq!(cache.get::<User>("user:1", opts).await.unwrap(), None);
        assert_eq!(cache.get::<u32>("dashboard:stats", opts).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mset_mget() {
        let cache = orchestrator(InvalidationRegistry::new());
        let entries = vec![("a".to_string(), 1u32), ("b".to_string(), 2u32)];
        cache
            .mset(&entries, Some(60), TierOptions::cold_only())
            .await
            .unwrap();
        cache
            .set("c", &3u32, Some(60), TierOptions::warm_only())
            .await
            .unwrap();

        let keys: Vec<String> = ["a", "missing", "c", "b"].iter().map(|s| s.to_string()).collect();
        let values = cache.mget::<u32>(&keys, TierOptions::default()).await.unwrap();
        assert_eq!(values, vec![Some(1), None, Some(3), Some(2)]);

        // cold hits were promoted
        let hot = cache.inner.hot.as_ref().unwrap();
        assert!(hot.get("a").await.unwrap().is_some());
        assert!(hot.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_pattern() {
        let cache = orchestrator(InvalidationRegistry::new());
        let opts = TierOptions::default();
        cache.set("user:1", &1u32, None, opts).await.unwrap();
        cache.set("user:2", &2u32, None, TierOptions::cold_only()).await.unwrap();
        cache.set("team:1", &3u32, None, opts).await.unwrap();

        assert_eq!(cache.invalidate_pattern("user:*").await.unwrap(), 2);
        assert_eq!(cache.get::<u32>("user:1", opts).await.unwrap(), None);
        assert_eq!(cache.get::<u32>("user:2", opts).await.unwrap(), None);
        assert_eq!(cache.get::<u32>("team:1", opts).await.unwrap(), Some(3));

        assert!(matches!(
            cache.invalidate_pattern("").await,
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_and_clear() {
        let cache = orchestrator(InvalidationRegistry::new());
        let opts = TierOptions::warm_only();
        cache.set("short", &1u32, Some(1), opts).await.unwrap();
        cache.set("long", &2u32, Some(0), opts).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(cache.warm_sizes(), vec![(Tier::Hot, 1), (Tier::Query, 1)]);

        cache.clear().await.unwrap();
        assert_eq!(cache.warm_sizes(), vec![(Tier::Hot, 0), (Tier::Query, 0)]);
    }

    #[tokio::test]
    async fn test_from_settings() {
        let cache = CacheOrchestrator::from_settings(&CacheSettings::default())
            .await
            .unwrap();
        assert_eq!(cache.cold_state(), Some(ColdState::Connected));
        assert!(cache.check_health().await);
        assert_eq!(cache.resolve_ttl(None, TierOptions::default()), 3600);
        assert_eq!(cache.resolve_ttl(None, TierOptions::default().with_ttl(5)), 5);
        assert_eq!(cache.resolve_ttl(Some(9), TierOptions::default().with_ttl(5)), 9);
    }
}
