//! Fetch and install statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Live network response (any status).
    Network,
    /// Network rejected; served from the current cache store.
    Cache,
}

/// Counters for fetch outcomes, shared across concurrent fetch events.
#[derive(Debug, Default)]
pub struct FetchStats {
    network: AtomicU64,
    cache: AtomicU64,
    misses: AtomicU64,
}

impl FetchStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            network: AtomicU64::new(0),
            cache: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Records a served response.
    pub fn record(&self, source: FetchSource) {
        let counter = match source {
            FetchSource::Network => &self.network,
            FetchSource::Cache => &self.cache,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request neither the network nor the cache could answer.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            network: self.network.load(Ordering::Relaxed),
            cache_fallback: self.cache.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FetchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchStatsSnapshot {
    pub network: u64,
    pub cache_fallback: u64,
    pub misses: u64,
}

/// Summary of a completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Version tag that was installed.
    pub version: String,
    /// Number of manifest entries stored.
    pub entries: usize,
    /// Total body bytes stored.
    pub bytes: u64,
    /// Time taken by the install.
    pub elapsed: Duration,
}
