//! Counters for price service monitoring.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Price service counters.
#[derive(Debug, Default)]
pub struct PricingMetrics {
    /// Requests answered from a fresh cache entry.
    pub cache_hits: AtomicU64,
    /// Requests that had to wait on a fetch.
    pub cache_misses: AtomicU64,
    /// Upstream resolutions started.
    pub fetches: AtomicU64,
    /// Upstream resolutions that produced no quote.
    pub fetch_failures: AtomicU64,
    /// Expired quotes served in place of an error.
    pub stale_served: AtomicU64,
    /// Requests that joined a resolution already in flight.
    pub flights_joined: AtomicU64,
}

impl PricingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_started(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flight_joined(&self) {
        self.flights_joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            flights_joined: self.flights_joined.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`PricingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub stale_served: u64,
    pub flights_joined: u64,
}

impl MetricsSnapshot {
    /// Share of requests answered from a fresh cache entry.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
