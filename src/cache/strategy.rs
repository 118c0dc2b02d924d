//! Cache strategies layered on the orchestrator.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::cache::{CacheError, CacheOrchestrator, TierOptions};

/// Whether an entry with `remaining` life out of `ttl_seconds` has used up at
/// least `threshold` of it. Entries without expiry never qualify.
pub(crate) fn should_refresh(remaining: Option<Duration>, ttl_seconds: u64, threshold: f64) -> bool {
    let Some(remaining) = remaining else {
        return false;
    };
    if ttl_seconds == 0 {
        return false;
    }
    let elapsed = 1.0 - remaining.as_secs_f64() / ttl_seconds as f64;
    elapsed >= threshold
}

impl CacheOrchestrator {
    /// Lazy loading: read, and on a miss compute and populate.
    pub async fn cache_aside<T, F, Fut, E>(
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
        self.get_or_set(key, compute, ttl_seconds, options).await
    }

    /// Persist first and cache only what the store accepted.
    ///
    /// `persist` returns the value as stored, which is what gets cached.
    pub async fn write_through<T, P, Fut, E>(
        &self,
        key: &str,
        value: T,
        persist: P,
        ttl_seconds: Option<u64>,
        options: TierOptions,
    ) -> Result<T, CacheError>
    where
        T: Serialize,
        P: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let stored = persist(value)
            .await
            .map_err(|e| CacheError::Persist(e.to_string()))?;
        self.set(key, &stored, ttl_seconds, options).await?;
        Ok(stored)
    }

    /// Cache now, persist in the background.
    ///
    /// Persist failures are logged and never reach the caller. Use
    /// [`CacheOrchestrator::close`] to wait for pending writes.
    pub async fn write_behind<T, P, Fut, E>(
        &self,
        key: &str,
        value: T,
        persist: P,
        ttl_seconds: Option<u64>,
        options: TierOptions,
    ) -> Result<(), CacheError>
    where
        T: Serialize + Send + 'static,
        P: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.set(key, &value, ttl_seconds, options).await?;

        let key = key.to_string();
        self.inner.tasks.spawn(async move {
            match persist(value).await {
                Ok(()) => debug!(key = %key, "Write-behind persisted"),
                Err(e) => error!(key = %key, error = %e, "Write-behind persist failed"),
            }
        });
        Ok(())
    }

    /// Serve the cached value and, once `threshold` of its TTL has elapsed,
    /// recompute it in the background. A miss computes inline.
    ///
    /// `threshold` defaults to the configured refresh-ahead threshold. At most
    /// one refresh per key runs at a time.
    pub async fn refresh_ahead<T, F, Fut, E>(
        &self,
        key: &str,
        compute: F,
        ttl_seconds: Option<u64>,
        threshold: Option<f64>,
        options: TierOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let ttl = self.resolve_ttl(ttl_seconds, options);
        let threshold = threshold.unwrap_or(self.inner.refresh_ahead_threshold);

        match self.get_entry::<T>(key, options).await {
            Ok(Some(entry)) => {
                if should_refresh(entry.remaining, ttl, threshold) {
                    self.spawn_refresh(key, compute, ttl, options);
                }
                return Ok(entry.value);
            }
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Cache read failed, treating as miss"),
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value, Some(ttl), options).await {
            warn!(key, error = %e, "Failed to store computed value");
        }
        Ok(value)
    }

    fn spawn_refresh<T, F, Fut, E>(&self, key: &str, compute: F, ttl: u64, options: TierOptions)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if !self.inner.refreshing.insert(key.to_string()) {
            return;
        }

        let this = self.clone();
        let key = key.to_string();
        self.inner.tasks.spawn(async move {
            let refresh = async {
                match compute().await {
                    Ok(value) => match this.set(&key, &value, Some(ttl), options).await {
                        Ok(()) => debug!(key = %key, ttl, "Refreshed ahead of expiry"),
                        Err(e) => warn!(key = %key, error = %e, "Failed to store refreshed value"),
                    },
                    Err(e) => warn!(key = %key, error = %e, "Refresh-ahead compute failed"),
                }
            };
            // the key must leave `refreshing` even if compute panics
            if AssertUnwindSafe(refresh).catch_unwind().await.is_err() {
                error!(key = %key, "Refresh-ahead compute panicked");
            }
            this.inner.refreshing.remove(&key);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::cache::ColdTier;

    fn orchestrator() -> CacheOrchestrator {
        CacheOrchestrator::builder()
            .hot(100)
            .query(100)
            .cold(ColdTier::in_memory(1000))
            .build()
    }

    #[test]
    fn test_should_refresh() {
        let secs = Duration::from_secs;
        assert!(!should_refresh(Some(secs(50)), 100, 0.8));
        assert!(should_refresh(Some(secs(15)), 100, 0.8));
        assert!(should_refresh(Some(secs(10)), 100, 0.8));
        assert!(!should_refresh(None, 100, 0.8));
        assert!(!should_refresh(Some(secs(10)), 0, 0.8));
    }

    #[tokio::test]
    async fn test_cache_aside() {
        let cache = orchestrator();
        let value: Result<String, CacheError> = cache
            .cache_aside("k", || async { Ok("v".to_string()) }, None, TierOptions::default())
            .await;
        assert_eq!(value.unwrap(), "v");
        assert_eq!(
            cache.get::<String>("k", TierOptions::default()).await.unwrap(),
            Some("v".to_string())
        );
    }

    #[tokio::test]
    async fn test_write_through_caches_only_on_success() {
        let cache = orchestrator();
        let opts = TierOptions::default();

        let stored = cache
            .write_through("order:1", 10u32, |v| async move { Ok::<_, String>(v + 1) }, None, opts)
            .await
            .unwrap();
        assert_eq!(stored, 11);
        assert_eq!(cache.get::<u32>("order:1", opts).await.unwrap(), Some(11));

        let err = cache
            .write_through(
                "order:2",
                20u32,
                |_| async move { Err::<u32, _>("db down") },
                None,
                opts,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Persist(msg) if msg == "db down"));
        assert_eq!(cache.get::<u32>("order:2", opts).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_behind_persists_in_background() {
        let cache = orchestrator();
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink = store.clone();

        cache
            .write_behind(
                "event:1",
                "created".to_string(),
                move |v| async move {
                    sink.lock().await.push(v);
                    Ok::<_, String>(())
                },
                None,
                TierOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            cache
                .get::<String>("event:1", TierOptions::default())
                .await
                .unwrap(),
            Some("created".to_string())
        );
        cache.close().await;
        assert_eq!(*store.lock().await, vec!["created".to_string()]);
    }

    #[tokio::test]
    async fn test_write_behind_failure_does_not_reach_caller() {
        let cache = orchestrator();
        let result = cache
            .write_behind(
                "event:2",
                1u32,
                |_| async move { Err::<(), _>("unreachable store") },
                None,
                TierOptions::default(),
            )
            .await;
        assert!(result.is_ok());
        cache.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ahead() {
        let cache = orchestrator();
        let opts = TierOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let load = |calls: Arc<AtomicUsize>| {
            move || async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) as u32) }
        };

        // miss computes inline
        let v = cache
            .refresh_ahead("k", load(calls.clone()), Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 0);

        // fresh hit, no refresh
        tokio::time::advance(Duration::from_secs(50)).await;
        let v = cache
            .refresh_ahead("k", load(calls.clone()), Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 0);
        cache.close().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // past 80% the stale value is served and refreshed behind it
        tokio::time::advance(Duration::from_secs(35)).await;
        let v = cache
            .refresh_ahead("k", load(calls.clone()), Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 0);
        cache.close().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let v = cache
            .refresh_ahead("k", load(calls.clone()), Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_refresh_releases_key() {
        let cache = orchestrator();
        let opts = TierOptions::default();
        cache.set("k", &1u32, Some(100), opts).await.unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;

        let exploding = || async {
            if true {
                panic!("loader exploded");
            }
            Ok::<u32, String>(0)
        };
        let v = cache
            .refresh_ahead("k", exploding, Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 1);
        cache.close().await;
        assert!(!cache.inner.refreshing.contains("k"));

        // the next stale hit schedules a refresh again
        let v = cache
            .refresh_ahead("k", || async { Ok::<u32, String>(2) }, Some(100), None, opts)
            .await
            .unwrap();
        assert_eq!(v, 1);
        cache.close().await;
        assert_eq!(cache.get::<u32>("k", opts).await.unwrap(), Some(2));
    }
}
