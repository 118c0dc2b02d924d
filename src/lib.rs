//! tiercache
//!
//! A three-tier cache (hot, query, cold) with pattern-driven invalidation
//! and four caching strategies, plus named background job queues with
//! retries, backoff, stall detection and cron schedules.

extern crate self as tiercache;

use shadow_rs::shadow;
shadow!(build);

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod monitor;
pub mod queue;
pub mod state;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
