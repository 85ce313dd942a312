//! Quotedesk Pricing Engine
//!
//! Resolves market prices for currency pairs and derives the platform's buy
//! and sell prices from them.
//!
//! # Features
//!
//! - Per-pair TTL cache with stale fallback when providers fail
//! - One upstream resolution per pair, shared by concurrent callers
//! - Bounded concurrency and retry with backoff under rate limiting
//! - Cross rates through a bridge currency when a pair has no direct quote
//! - Background refresh of hot pairs
//!
//! # Example
//!
//! ```rust,ignore
//! use quotedesk_pricing::{CoinbaseProvider, PriceService, PricingConfig, QuoteOptions};
//!
//! let config = PricingConfig::default();
//! let coinbase = CoinbaseProvider::new(
//!     quotedesk_pricing::provider::coinbase::DEFAULT_BASE_URL,
//!     config.request_timeout,
//! )?;
//! let service = PriceService::new(vec![Arc::new(coinbase)], config)?;
//!
//! let quote = service.get_price("usdt/xof", QuoteOptions::amount(10.0)).await?;
//! ```

pub mod cache;
pub mod config;
pub mod cross_rate;
pub mod error;
pub mod limiter;
pub mod margin;
pub mod metrics;
pub mod prewarm;
pub mod provider;
pub mod response;
pub mod retry;
pub mod service;
pub mod single_flight;

pub use cache::{CacheStats, QuoteCache};
pub use config::PricingConfig;
pub use cross_rate::CrossRateResolver;
pub use error::{PricingError, PricingResult};
pub use limiter::ConcurrencyLimiter;
pub use margin::MarginPolicy;
pub use metrics::MetricsSnapshot;
pub use prewarm::{PrewarmConfig, Prewarmer, PrewarmerHandle};
pub use provider::{CoinGeckoProvider, CoinbaseProvider, PriceProvider, ProviderCallResult};
pub use response::{ConvertedAmount, Direction, QuoteOptions, QuoteResponse};
pub use retry::{RetryPolicy, RetryingFetcher};
pub use service::{PriceService, ResolvedQuote};
pub use single_flight::SingleFlightGroup;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockPriceProvider;
