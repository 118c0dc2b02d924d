//! Application state.
//!
//! Owns the cache orchestrator, the queue registry and the monitor. Built
//! once from [`Settings`] and passed to whatever needs it; there are no
//! process-wide registries.

use std::sync::Arc;

use tracing::info;

use crate::cache::CacheOrchestrator;
use crate::config::Settings;
use crate::error::AppResult;
use crate::monitor::Monitor;
use crate::queue::QueueRegistry;

/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheOrchestrator,
    pub queues: Arc<QueueRegistry>,
    pub monitor: Monitor,
}

impl AppState {
    /// Connect the cold tier and create every configured queue.
    ///
    /// # Example
    /// ```ignore
    /// let settings = ConfigLoader::new()?.load()?;
    /// let state = AppState::init(&settings).await?;
    /// state.queues.register_processor("email", "welcome", handler, 4)?;
    /// ```
    pub async fn init(settings: &Settings) -> AppResult<Self> {
        let cache = CacheOrchestrator::from_settings(&settings.cache).await?;
        let queues = Arc::new(QueueRegistry::from_settings(&settings.queues));
        let monitor = Monitor::new(cache.clone(), queues.clone());

        info!(
            queues = ?queues.queue_names(),
            cold_state = ?cache.cold_state(),
            "Application state initialized"
        );
        Ok(Self {
            cache,
            queues,
            monitor,
        })
    }

    /// Stop workers and schedules, then wait for background cache writes.
    pub async fn close(&self) {
        self.queues.close().await;
        self.cache.close().await;
        info!("Application state closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TierOptions;
    use crate::config::{ColdBackend, QueueSettings};
    use crate::monitor::HealthStatus;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.cache.cold.backend = ColdBackend::Memory;
        settings.queues = vec![QueueSettings::named("email"), QueueSettings::named("reports")];
        settings
    }

    #[tokio::test]
    async fn test_init_and_close() {
        let state = AppState::init(&settings()).await.unwrap();
        assert_eq!(
            state.queues.queue_names(),
            vec!["email".to_string(), "reports".to_string()]
        );

        state
            .cache
            .set("k", "v", Some(0), TierOptions::default())
            .await
            .unwrap();
        assert_eq!(state.monitor.health().await.status, HealthStatus::Healthy);

        state.close().await;
    }
}
