//! Per-tier hit/miss counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::cache::Tier;

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TierCounters {
    fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free counters shared by every clone of the orchestrator.
#[derive(Debug, Default)]
pub struct CacheStats {
    hot: TierCounters,
    query: TierCounters,
    cold: TierCounters,
}

impl CacheStats {
    fn counters(&self, tier: Tier) -> &TierCounters {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Query => &self.query,
            Tier::Cold => &self.cold,
        }
    }

    pub fn record_hit(&self, tier: Tier) {
        self.counters(tier).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tier: Tier) {
        self.counters(tier).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hot: self.hot.snapshot(),
            query: self.query.snapshot(),
            cold: self.cold.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
}

impl TierStats {
    /// Fraction of lookups that hit, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hot: TierStats,
    pub query: TierStats,
    pub cold: TierStats,
}

impl CacheStatsSnapshot {
    pub fn tier(&self, tier: Tier) -> TierStats {
        match tier {
            Tier::Hot => self.hot,
            Tier::Query => self.query,
            Tier::Cold => self.cold,
        }
    }
}
