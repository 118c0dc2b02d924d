use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One of the three cache tiers, warmest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Query,
    Cold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Hot => write!(f, "hot"),
            Tier::Query => write!(f, "query"),
            Tier::Cold => write!(f, "cold"),
        }
    }
}

/// Per-call tier selection.
///
/// `ttl` is the fallback TTL in seconds for writes and backfills made by the
/// call; `None` means the configured default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierOptions {
    pub use_hot: bool,
    pub use_query: bool,
    pub use_cold: bool,
    pub ttl: Option<u64>,
}

impl Default for TierOptions {
    fn default() -> Self {
        Self {
            use_hot: true,
            use_query: true,
            use_cold: true,
            ttl: None,
        }
    }
}

impl TierOptions {
    /// Only the in-process tiers.
    pub fn warm_only() -> Self {
        Self {
            use_cold: false,
            ..Self::default()
        }
    }

    /// Only the distributed tier.
    pub fn cold_only() -> Self {
        Self {
            use_hot: false,
            use_query: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub fn uses(&self, tier: Tier) -> bool {
        match tier {
            Tier::Hot => self.use_hot,
            Tier::Query => self.use_query,
            Tier::Cold => self.use_cold,
        }
    }
}

/// A value read from the cache together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    /// Remaining TTL in whole seconds as reported by the answering tier,
    /// `0` when the entry does not expire.
    pub ttl_seconds: u64,
    pub tier: Tier,
    pub remaining: Option<Duration>,
}

/// Round a remaining TTL up to whole seconds so a live entry never becomes a
/// non-expiring one.
pub(crate) fn ttl_secs_ceil(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_options() {
        let opts = TierOptions::default();
        assert!(opts.uses(Tier::Hot) && opts.uses(Tier::Query) && opts.uses(Tier::Cold));

        let warm = TierOptions::warm_only().with_ttl(30);
        assert!(!warm.uses(Tier::Cold));
        assert_eq!(warm.ttl, Some(30));

        let cold = TierOptions::cold_only();
        assert!(!cold.uses(Tier::Hot) && !cold.uses(Tier::Query) && cold.uses(Tier::Cold));
    }

    #[test]
    fn test_ttl_secs_ceil() {
        assert_eq!(ttl_secs_ceil(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs_ceil(Duration::from_secs(3)), 3);
        assert_eq!(ttl_secs_ceil(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs_ceil(Duration::ZERO), 1);
    }
}
