//! Health probe and stats snapshot over the cache and the queues.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheOrchestrator, ColdState, Tier, TierStats};
use crate::queue::{QueueRegistry, QueueStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Whether the primary cold store answered the probe. Always true when
    /// the cold tier is disabled.
    pub store_connected: bool,
    /// `None` when the cold tier is disabled.
    pub cold_state: Option<ColdState>,
    pub version: String,
    pub timestamp: Timestamp,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub tiers: BTreeMap<Tier, TierStats>,
    pub queues: BTreeMap<String, QueueStats>,
}

/// Read-only facade used by the CLI and by embedding applications.
#[derive(Clone)]
pub struct Monitor {
    cache: CacheOrchestrator,
    queues: Arc<QueueRegistry>,
}

impl Monitor {
    pub fn new(cache: CacheOrchestrator, queues: Arc<QueueRegistry>) -> Self {
        Self { cache, queues }
    }

    /// Probe the cold store. The probe also moves the cold tier in or out of
    /// degraded mode.
    pub async fn health(&self) -> HealthReport {
        let start = std::time::Instant::now();
        let store_connected = self.cache.check_health().await;

        HealthReport {
            status: if store_connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            store_connected,
            cold_state: self.cache.cold_state(),
            version: crate::pkg_version().to_string(),
            timestamp: Timestamp::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let stats = self.cache.stats();
        let tiers = [Tier::Hot, Tier::Query, Tier::Cold]
            .into_iter()
            .map(|tier| (tier, stats.tier(tier)))
            .collect();

        StatsSnapshot {
            tiers,
            queues: self.queues.get_all_queue_stats().await,
        }
    }
}
