//! The price service: cache, coalescing, limiting and fallback behind one call.

use quotedesk_common::{age_of, Derivation, PairKey, Quote};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, QuoteCache};
use crate::config::PricingConfig;
use crate::cross_rate::CrossRateResolver;
use crate::error::{FetchError, PricingError, PricingResult};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::{MetricsSnapshot, PricingMetrics};
use crate::provider::PriceProvider;
use crate::response::{QuoteOptions, QuoteResponse};
use crate::retry::RetryingFetcher;
use crate::single_flight::SingleFlightGroup;

/// A quote plus whether it came from an expired cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuote {
    pub quote: Quote,
    pub stale: bool,
}

struct Inner {
    providers: Vec<Arc<dyn PriceProvider>>,
    fetcher: RetryingFetcher,
    cross: CrossRateResolver,
    cache: QuoteCache,
    flights: SingleFlightGroup<PairKey, PricingResult<Quote>>,
    limiter: ConcurrencyLimiter,
    metrics: PricingMetrics,
    config: PricingConfig,
}

/// Resolves prices for currency pairs.
///
/// Cheap to clone; clones share cache, in-flight registry and limiter.
#[derive(Clone)]
pub struct PriceService {
    inner: Arc<Inner>,
}

impl PriceService {
    /// Create a service querying `providers` in priority order.
    pub fn new(
        providers: Vec<Arc<dyn PriceProvider>>,
        config: PricingConfig,
    ) -> PricingResult<Self> {
        config.validate().map_err(PricingError::Configuration)?;
        if providers.is_empty() {
            return Err(PricingError::Configuration(
                "At least one price provider is required".to_string(),
            ));
        }

        let fetcher = RetryingFetcher::new(config.retry.clone(), config.request_timeout);
        let cross = CrossRateResolver::new(
            fetcher.clone(),
            config.bridge_currency.clone(),
            config.leg_timeout,
        );

        info!(
            providers = ?providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            bridge = %config.bridge_currency,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            max_concurrent = config.max_concurrent,
            "Price service initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                providers,
                fetcher,
                cross,
                cache: QuoteCache::new(config.cache_ttl),
                flights: SingleFlightGroup::new(),
                limiter: ConcurrencyLimiter::new(config.max_concurrent),
                metrics: PricingMetrics::new(),
                config,
            }),
        })
    }

    /// Price a pair given as free-form text, optionally converting an amount.
    #[instrument(skip(self))]
    pub async fn get_price(
        &self,
        raw_pair: &str,
        options: QuoteOptions,
    ) -> PricingResult<QuoteResponse> {
        let pair = PairKey::normalize(raw_pair)?;
        options.validate()?;

        let resolved = self.get_quote(&pair).await?;
        QuoteResponse::build(
            &resolved.quote,
            resolved.stale,
            &options,
            self.inner.config.display_decimals,
        )
    }

    /// Quote for an already normalized pair.
    ///
    /// Serves a fresh cache entry when there is one. Otherwise joins the
    /// pair's in-flight resolution, or starts it, and waits up to the
    /// configured deadline. A failed or late resolution falls back to the
    /// last cached quote, flagged stale.
    pub async fn get_quote(&self, pair: &PairKey) -> PricingResult<ResolvedQuote> {
        let inner = &self.inner;

        if let Some(quote) = inner.cache.get(pair) {
            inner.metrics.cache_hit();
            return Ok(ResolvedQuote {
                quote,
                stale: false,
            });
        }
        inner.metrics.cache_miss();

        self.join_resolution(pair, true).await
    }

    /// Resolve `pair` upstream even when its cached quote is still fresh.
    ///
    /// Used to keep hot pairs ahead of their expiry. Still joins a
    /// resolution already in flight for the pair, and falls back to the
    /// cached quote like [`get_quote`](Self::get_quote).
    pub async fn refresh(&self, pair: &PairKey) -> PricingResult<ResolvedQuote> {
        self.join_resolution(pair, false).await
    }

    async fn join_resolution(
        &self,
        pair: &PairKey,
        reuse_fresh: bool,
    ) -> PricingResult<ResolvedQuote> {
        let inner = &self.inner;
        let shared = Arc::clone(inner);
        let key = pair.clone();
        let flight = inner.flights.join(pair.clone(), move || async move {
            // A flight that just finished may have filled the cache after
            // the caller's own lookup.
            if reuse_fresh {
                if let Some(quote) = shared.cache.get(&key) {
                    return Ok(quote);
                }
            }
            shared.resolve(&key).await
        });
        if !flight.is_leader() {
            inner.metrics.flight_joined();
            debug!(pair = %pair, "Joined in-flight resolution");
        }

        let deadline = inner.config.deadline;
        let error = match tokio::time::timeout(deadline, flight.wait()).await {
            Ok(Some(Ok(quote))) => {
                return Ok(ResolvedQuote {
                    quote,
                    stale: false,
                })
            }
            Ok(Some(Err(e))) => e,
            Ok(None) => PricingError::Internal(format!("Resolution of {pair} was aborted")),
            Err(_) => PricingError::DeadlineExceeded {
                pair: pair.clone(),
                deadline_ms: deadline.as_millis() as u64,
            },
        };

        self.stale_or(pair, error)
    }

    /// Last quote resolved for `pair`, fresh or stale, without any I/O.
    pub fn get_cached(&self, pair: &PairKey) -> Option<Quote> {
        self.inner.cache.get_stale_fallback(pair)
    }

    /// Counters since startup.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Resolutions currently running upstream.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    fn stale_or(&self, pair: &PairKey, error: PricingError) -> PricingResult<ResolvedQuote> {
        match self.inner.cache.get_stale_fallback(pair) {
            Some(quote) => {
                self.inner.metrics.stale_served();
                warn!(
                    pair = %pair,
                    age_secs = age_of(quote.resolved_at()).as_secs(),
                    error = %error,
                    "Serving stale quote"
                );
                Ok(ResolvedQuote { quote, stale: true })
            }
            None => Err(error),
        }
    }
}

impl Inner {
    /// Resolve `pair` upstream and cache the result.
    ///
    /// Holds one limiter slot for the whole resolution. Providers are tried
    /// in order, each direct first and then through the bridge currency.
    async fn resolve(&self, pair: &PairKey) -> PricingResult<Quote> {
        let _permit = self.limiter.acquire().await?;
        self.metrics.fetch_started();

        for provider in &self.providers {
            let (price, derivation) = match self.price_from(provider.as_ref(), pair).await {
                Ok(priced) => priced,
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        pair = %pair,
                        error = %e,
                        "Provider could not price pair"
                    );
                    continue;
                }
            };

            let (buy, sell) = self.config.margin.apply(price);
            match Quote::try_new(pair.clone(), price, buy, sell, provider.name(), derivation) {
                Ok(quote) => {
                    self.cache.insert(quote.clone());
                    info!(
                        provider = provider.name(),
                        pair = %pair,
                        market_price = price,
                        derivation = %derivation,
                        "Quote resolved"
                    );
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(provider = provider.name(), pair = %pair, error = %e, "Rejected quote");
                }
            }
        }

        self.metrics.fetch_failed();
        Err(PricingError::PriceUnavailable { pair: pair.clone() })
    }

    async fn price_from(
        &self,
        provider: &dyn PriceProvider,
        pair: &PairKey,
    ) -> Result<(f64, Derivation), FetchError> {
        let leg_timeout = self.config.leg_timeout;
        let direct = tokio::time::timeout(leg_timeout, self.fetcher.fetch_with_retry(provider, pair))
            .await
            .unwrap_or(Err(FetchError::TimedOut(leg_timeout)));

        match direct {
            Ok(price) => Ok((price, Derivation::Direct)),
            Err(e) => {
                debug!(
                    provider = provider.name(),
                    pair = %pair,
                    error = %e,
                    "Direct quote failed, trying bridge currency"
                );
                let rate = self.cross.resolve(provider, pair).await?;
                Ok((rate.price, rate.derivation))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockPriceProvider;
    use crate::response::{ConvertedAmount, Direction};
    use quotedesk_common::CurrencyCode;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio::task::JoinSet;

    fn service_with(
        providers: Vec<Arc<MockPriceProvider>>,
        config: PricingConfig,
    ) -> PriceService {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn PriceProvider>)
            .collect();
        PriceService::new(providers, config).unwrap()
    }

    fn usdt_xof() -> PairKey {
        PairKey::new("USDT", "XOF")
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let mock = Arc::new(
            MockPriceProvider::new("test").with_latency(Duration::from_millis(100)),
        );
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        let mut callers = JoinSet::new();
        for _ in 0..10 {
            let service = service.clone();
            callers.spawn(async move { service.get_price("usdt/xof", QuoteOptions::default()).await });
        }

        let mut responses = Vec::new();
        while let Some(joined) = callers.join_next().await {
            responses.push(joined.unwrap().unwrap());
        }

        assert_eq!(mock.spot_calls(&usdt_xof()), 1);
        assert!(responses.iter().all(|r| r == &responses[0]));
        assert_eq!(responses[0].market_price, dec!(600));
        assert_eq!(service.metrics().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_serves_until_ttl() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        service.get_price("USDT-XOF", QuoteOptions::default()).await.unwrap();
        tokio::time::advance(Duration::from_millis(29_999)).await;
        service.get_price("USDT_XOF", QuoteOptions::default()).await.unwrap();
        assert_eq!(mock.spot_calls(&usdt_xof()), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        service.get_price("USDT-XOF", QuoteOptions::default()).await.unwrap();
        assert_eq!(mock.spot_calls(&usdt_xof()), 2);

        let metrics = service.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_when_provider_fails() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        let fresh = service.get_price("USDT-XOF", QuoteOptions::default()).await.unwrap();
        assert!(!fresh.stale);

        mock.remove_spot(&usdt_xof());
        tokio::time::advance(Duration::from_secs(31)).await;

        let stale = service.get_price("USDT-XOF", QuoteOptions::default()).await.unwrap();
        assert!(stale.stale);
        assert_eq!(stale.market_price, dec!(600));
        assert_eq!(stale.resolved_at, fresh.resolved_at);
        assert_eq!(service.metrics().stale_served, 1);
        assert_eq!(service.metrics().fetch_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_without_cache() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        let service = service_with(vec![mock], PricingConfig::default());

        let result = service.get_price("ABC-XYZ", QuoteOptions::default()).await;
        assert_eq!(
            result,
            Err(PricingError::PriceUnavailable {
                pair: PairKey::new("ABC", "XYZ"),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_rejected_before_io() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        let service = service_with(vec![mock], PricingConfig::default());

        let bad_pair = service.get_price("BTC", QuoteOptions::default()).await;
        assert!(matches!(bad_pair, Err(PricingError::InvalidPairFormat(_))));

        let bad_amount = service
            .get_price("USDT-XOF", QuoteOptions::amount(-5.0))
            .await;
        assert_eq!(bad_amount, Err(PricingError::InvalidAmount(-5.0)));

        assert_eq!(service.metrics().fetches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_with_direction() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock], PricingConfig::default());

        let options = QuoteOptions::amount(10.0).with_direction(Direction::Sell);
        let response = service.get_price("USDT-XOF", options).await.unwrap();

        assert_eq!(response.buy_price_for_platform, dec!(597));
        assert_eq!(response.sell_price_for_platform, dec!(618));
        assert_eq!(
            response.converted_amount,
            Some(ConvertedAmount::Single(dec!(5970)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_leaves_fetch_running() {
        let mock = Arc::new(MockPriceProvider::new("slow").with_latency(Duration::from_secs(5)));
        mock.set_spot(usdt_xof(), 600.0);
        let config = PricingConfig {
            deadline: Duration::from_secs(1),
            ..Default::default()
        };
        let service = service_with(vec![mock.clone()], config);

        let result = service.get_price("USDT-XOF", QuoteOptions::default()).await;
        assert_eq!(
            result,
            Err(PricingError::DeadlineExceeded {
                pair: usdt_xof(),
                deadline_ms: 1000,
            })
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(service.get_cached(&usdt_xof()).is_some());
        assert_eq!(mock.spot_calls(&usdt_xof()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_rate_fallback() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(PairKey::new("ABC", "USD"), 10.0);
        mock.set_table(CurrencyCode::usd(), &[("XOF", 600.0)]);
        let service = service_with(vec![mock], PricingConfig::default());

        let response = service.get_price("abc-xof", QuoteOptions::default()).await.unwrap();

        assert_eq!(response.market_price, dec!(6000));
        assert_eq!(response.buy_price_for_platform, dec!(5970));
        assert_eq!(response.derivation, Derivation::Cross);
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_tried_in_order() {
        let primary = Arc::new(MockPriceProvider::new("primary"));
        let secondary = Arc::new(MockPriceProvider::new("secondary"));
        secondary.set_spot(usdt_xof(), 601.0);
        secondary.set_spot(PairKey::new("BTC", "USD"), 67_000.0);
        primary.set_spot(PairKey::new("BTC", "USD"), 66_900.0);
        let service = service_with(
            vec![primary.clone(), secondary.clone()],
            PricingConfig::default(),
        );

        let fallback = service.get_price("USDT-XOF", QuoteOptions::default()).await.unwrap();
        assert_eq!(fallback.source, "secondary");

        let preferred = service.get_price("BTC-USD", QuoteOptions::default()).await.unwrap();
        assert_eq!(preferred.source, "primary");
        assert_eq!(secondary.spot_calls(&PairKey::new("BTC", "USD")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_serializes_distinct_pairs() {
        let mock = Arc::new(
            MockPriceProvider::new("test").with_latency(Duration::from_millis(100)),
        );
        mock.set_spot(usdt_xof(), 600.0);
        mock.set_spot(PairKey::new("BTC", "USD"), 67_000.0);
        let config = PricingConfig {
            max_concurrent: 1,
            ..Default::default()
        };
        let service = service_with(vec![mock], config);

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            service.get_price("USDT-XOF", QuoteOptions::default()),
            service.get_price("BTC-USD", QuoteOptions::default()),
        );

        assert!(a.is_ok() && b.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_leader_reuses_fresh_entry() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        let first = service.get_quote(&usdt_xof()).await.unwrap();

        // A caller that missed the cache just before the entry landed.
        let late = service.join_resolution(&usdt_xof(), true).await.unwrap();

        assert_eq!(late.quote, first.quote);
        assert!(!late.stale);
        assert_eq!(mock.spot_calls(&usdt_xof()), 1);
        assert_eq!(service.metrics().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_fresh_entry() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        service.get_quote(&usdt_xof()).await.unwrap();
        mock.set_spot(usdt_xof(), 605.0);
        tokio::time::advance(Duration::from_secs(10)).await;

        let refreshed = service.refresh(&usdt_xof()).await.unwrap();

        assert!(!refreshed.stale);
        assert_eq!(refreshed.quote.market_price(), 605.0);
        assert_eq!(mock.spot_calls(&usdt_xof()), 2);
        assert_eq!(service.metrics().cache_misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_falls_back_to_stale() {
        let mock = Arc::new(MockPriceProvider::new("test"));
        mock.set_spot(usdt_xof(), 600.0);
        let service = service_with(vec![mock.clone()], PricingConfig::default());

        service.get_quote(&usdt_xof()).await.unwrap();
        mock.remove_spot(&usdt_xof());

        let refreshed = service.refresh(&usdt_xof()).await.unwrap();
        assert!(refreshed.stale);
        assert_eq!(refreshed.quote.market_price(), 600.0);
    }

    #[test]
    fn test_rejects_empty_provider_list() {
        let result = PriceService::new(Vec::new(), PricingConfig::default());
        assert!(matches!(result, Err(PricingError::Configuration(_))));
    }
}
