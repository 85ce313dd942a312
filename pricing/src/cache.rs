//! Quote caching with TTL and stale fallback.

use dashmap::DashMap;
use quotedesk_common::{PairKey, Quote};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cached quote entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Quote,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(quote: Quote, ttl: Duration) -> Self {
        Self {
            quote,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe quote cache keyed by normalized pair.
///
/// Expired entries are never evicted: they stay readable through
/// [`QuoteCache::get_stale_fallback`] until a newer quote replaces them.
pub struct QuoteCache {
    cache: DashMap<PairKey, CacheEntry>,
    default_ttl: Duration,
}

impl QuoteCache {
    /// Create a cache whose entries live for `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            default_ttl,
        }
    }

    /// Get a quote only if it has not expired.
    pub fn get(&self, pair: &PairKey) -> Option<Quote> {
        match self.cache.get(pair) {
            Some(entry) if entry.is_fresh() => {
                debug!(pair = %pair, "Cache hit");
                Some(entry.quote.clone())
            }
            Some(_) => {
                debug!(pair = %pair, "Cache entry expired");
                None
            }
            None => {
                debug!(pair = %pair, "Cache miss");
                None
            }
        }
    }

    /// Get the last quote stored for `pair`, fresh or not.
    pub fn get_stale_fallback(&self, pair: &PairKey) -> Option<Quote> {
        self.cache.get(pair).map(|entry| entry.quote.clone())
    }

    /// Insert a quote with the default TTL.
    pub fn insert(&self, quote: Quote) {
        self.put(quote, self.default_ttl);
    }

    /// Insert a quote living for `ttl`, replacing any previous entry.
    pub fn put(&self, quote: Quote, ttl: Duration) {
        let pair = quote.pair().clone();
        self.cache.insert(pair, CacheEntry::new(quote, ttl));
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.cache.len();
        let fresh = self.cache.iter().filter(|e| e.is_fresh()).count();

        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            stale_entries: total - fresh,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}
