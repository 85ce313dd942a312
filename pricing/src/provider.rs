//! Market-data provider trait and call results.

pub mod coinbase;
pub mod coingecko;
mod http;

use async_trait::async_trait;
use quotedesk_common::{CurrencyCode, PairKey};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::FailureClass;

pub use coinbase::CoinbaseProvider;
pub use coingecko::CoinGeckoProvider;

/// Units of each currency per one unit of the table's base currency.
pub type RateTable = HashMap<CurrencyCode, f64>;

/// Outcome of a single provider call.
///
/// Every provider maps its transport and payload failures onto these four
/// cases; nothing upstream inspects raw HTTP errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCallResult<T = f64> {
    /// The call succeeded.
    Ok(T),
    /// The provider has no data for this pair or currency at all.
    Unsupported,
    /// The provider throttled us, with its suggested wait if it gave one.
    RateLimited(Option<Duration>),
    /// Any other failure; eligible for retry.
    TransientError(String),
}

impl<T> ProviderCallResult<T> {
    /// Map the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderCallResult<U> {
        match self {
            ProviderCallResult::Ok(value) => ProviderCallResult::Ok(f(value)),
            ProviderCallResult::Unsupported => ProviderCallResult::Unsupported,
            ProviderCallResult::RateLimited(wait) => ProviderCallResult::RateLimited(wait),
            ProviderCallResult::TransientError(cause) => ProviderCallResult::TransientError(cause),
        }
    }

    /// Chain a fallible step onto the success value.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> ProviderCallResult<U>) -> ProviderCallResult<U> {
        match self {
            ProviderCallResult::Ok(value) => f(value),
            ProviderCallResult::Unsupported => ProviderCallResult::Unsupported,
            ProviderCallResult::RateLimited(wait) => ProviderCallResult::RateLimited(wait),
            ProviderCallResult::TransientError(cause) => ProviderCallResult::TransientError(cause),
        }
    }

    /// Failure class for retryable outcomes.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            ProviderCallResult::RateLimited(wait) => Some(FailureClass::RateLimited {
                retry_after: *wait,
            }),
            ProviderCallResult::TransientError(cause) => {
                Some(FailureClass::Transient(cause.clone()))
            }
            ProviderCallResult::Ok(_) | ProviderCallResult::Unsupported => None,
        }
    }
}

/// Source of spot prices and exchange-rate tables.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name, recorded as the quote source.
    fn name(&self) -> &str;

    /// Spot price of one unit of `pair.base()` in `pair.quote()`.
    async fn fetch_spot(&self, pair: &PairKey) -> ProviderCallResult<f64>;

    /// Rates of every known currency against `base`.
    async fn fetch_rate_table(&self, base: &CurrencyCode) -> ProviderCallResult<RateTable>;
}

/// Scripted provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockPriceProvider {
    name: String,
    spots: dashmap::DashMap<PairKey, std::collections::VecDeque<ProviderCallResult<f64>>>,
    tables: dashmap::DashMap<CurrencyCode, ProviderCallResult<RateTable>>,
    spot_calls: dashmap::DashMap<PairKey, usize>,
    table_calls: std::sync::atomic::AtomicUsize,
    latency: Option<Duration>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockPriceProvider {
    /// Create a provider that supports nothing yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spots: dashmap::DashMap::new(),
            tables: dashmap::DashMap::new(),
            spot_calls: dashmap::DashMap::new(),
            table_calls: std::sync::atomic::AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Always answer `price` for `pair`.
    pub fn set_spot(&self, pair: PairKey, price: f64) {
        self.script_spot(pair, vec![ProviderCallResult::Ok(price)]);
    }

    /// Answer the scripted results in order; the last one repeats.
    pub fn script_spot(&self, pair: PairKey, results: Vec<ProviderCallResult<f64>>) {
        self.spots.insert(pair, results.into());
    }

    /// Forget `pair`, which becomes unsupported.
    pub fn remove_spot(&self, pair: &PairKey) {
        self.spots.remove(pair);
    }

    /// Serve a rate table for `base`.
    pub fn set_table(&self, base: CurrencyCode, rates: &[(&str, f64)]) {
        let table = rates
            .iter()
            .map(|(code, rate)| (CurrencyCode::new(*code), *rate))
            .collect();
        self.tables.insert(base, ProviderCallResult::Ok(table));
    }

    /// Answer `result` for every table request on `base`.
    pub fn set_table_result(&self, base: CurrencyCode, result: ProviderCallResult<RateTable>) {
        self.tables.insert(base, result);
    }

    /// Number of spot calls made for `pair`.
    pub fn spot_calls(&self, pair: &PairKey) -> usize {
        self.spot_calls.get(pair).map(|c| *c).unwrap_or(0)
    }

    /// Number of rate-table calls made.
    pub fn table_calls(&self) -> usize {
        self.table_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl PriceProvider for MockPriceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_spot(&self, pair: &PairKey) -> ProviderCallResult<f64> {
        *self.spot_calls.entry(pair.clone()).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let Some(mut script) = self.spots.get_mut(pair) else {
            return ProviderCallResult::Unsupported;
        };
        if script.len() > 1 {
            script
                .pop_front()
                .unwrap_or(ProviderCallResult::Unsupported)
        } else {
            script
                .front()
                .cloned()
                .unwrap_or(ProviderCallResult::Unsupported)
        }
    }

    async fn fetch_rate_table(&self, base: &CurrencyCode) -> ProviderCallResult<RateTable> {
        self.table_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.tables
            .get(base)
            .map(|r| r.clone())
            .unwrap_or(ProviderCallResult::Unsupported)
    }
}
