//! Cross-rate fallback through a bridge currency.

use std::time::Duration;

use quotedesk_common::{CurrencyCode, Derivation, PairKey};
use tracing::debug;

use crate::error::{FailureClass, FetchError};
use crate::provider::PriceProvider;
use crate::retry::RetryingFetcher;

/// A price derived without a direct quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossRate {
    pub price: f64,
    pub derivation: Derivation,
}

/// Prices `BASE-QUOTE` by composing two legs through a bridge currency.
///
/// Strategies, first success wins:
/// 1. `BASE-BRIDGE` spot times the bridge rate table's `QUOTE` entry.
/// 2. `BASE-BRIDGE` spot divided by the `QUOTE-BRIDGE` spot.
///
/// Every leg goes through the retrying fetcher and is bounded by its own
/// timeout.
#[derive(Debug, Clone)]
pub struct CrossRateResolver {
    fetcher: RetryingFetcher,
    bridge: CurrencyCode,
    leg_timeout: Duration,
}

impl CrossRateResolver {
    /// Create a resolver bridging through `bridge`.
    pub fn new(fetcher: RetryingFetcher, bridge: CurrencyCode, leg_timeout: Duration) -> Self {
        Self {
            fetcher,
            bridge,
            leg_timeout,
        }
    }

    /// Derive a price for `pair` from `provider`.
    ///
    /// On failure, returns the error of the last leg tried. A base leg that
    /// failed outright ends the resolution, since both strategies need it.
    pub async fn resolve(
        &self,
        provider: &dyn PriceProvider,
        pair: &PairKey,
    ) -> Result<CrossRate, FetchError> {
        let base_leg = match self.leg_price(provider, pair.base()).await {
            Ok(base_in_bridge) => {
                match self.bridge_rate(provider, pair.quote()).await {
                    Ok(bridge_to_quote) => {
                        return checked(base_in_bridge * bridge_to_quote, Derivation::Cross);
                    }
                    Err(e) => {
                        debug!(
                            provider = provider.name(),
                            pair = %pair,
                            bridge = %self.bridge,
                            error = %e,
                            "Bridge rate table has no usable rate"
                        );
                    }
                }
                Some(base_in_bridge)
            }
            // Only a timed-out base leg is worth a second try.
            Err(FetchError::TimedOut(_)) => None,
            Err(e) => return Err(e),
        };

        let quote_in_bridge = self.leg_price(provider, pair.quote()).await?;
        let bridge_to_quote = 1.0 / quote_in_bridge;
        let base_in_bridge = match base_leg {
            Some(price) => price,
            None => self.leg_price(provider, pair.base()).await?,
        };

        checked(base_in_bridge * bridge_to_quote, Derivation::Inverted)
    }

    /// Price of one unit of `currency` in the bridge currency.
    async fn leg_price(
        &self,
        provider: &dyn PriceProvider,
        currency: &CurrencyCode,
    ) -> Result<f64, FetchError> {
        if *currency == self.bridge {
            return Ok(1.0);
        }

        let leg = PairKey::new(currency.clone(), self.bridge.clone());
        tokio::time::timeout(self.leg_timeout, self.fetcher.fetch_with_retry(provider, &leg))
            .await
            .unwrap_or(Err(FetchError::TimedOut(self.leg_timeout)))
    }

    /// Units of `quote` per one unit of the bridge currency, from the rate table.
    async fn bridge_rate(
        &self,
        provider: &dyn PriceProvider,
        quote: &CurrencyCode,
    ) -> Result<f64, FetchError> {
        if *quote == self.bridge {
            return Ok(1.0);
        }

        let table = tokio::time::timeout(
            self.leg_timeout,
            self.fetcher.fetch_table_with_retry(provider, &self.bridge),
        )
        .await
        .unwrap_or(Err(FetchError::TimedOut(self.leg_timeout)))?;

        match table.get(quote) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
            _ => Err(FetchError::Unsupported),
        }
    }
}

fn checked(price: f64, derivation: Derivation) -> Result<CrossRate, FetchError> {
    if price.is_finite() && price > 0.0 {
        Ok(CrossRate { price, derivation })
    } else {
        Err(FetchError::Failed {
            attempts: 1,
            last: FailureClass::Transient(format!("derived price {price} is not usable")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockPriceProvider, ProviderCallResult};
    use crate::retry::RetryPolicy;

    fn resolver(leg_timeout: Duration) -> CrossRateResolver {
        let fetcher = RetryingFetcher::new(RetryPolicy::default(), Duration::from_secs(8));
        CrossRateResolver::new(fetcher, CurrencyCode::usd(), leg_timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_via_rate_table() {
        let provider = MockPriceProvider::new("test");
        provider.set_spot(PairKey::new("ABC", "USD"), 10.0);
        provider.set_table(CurrencyCode::usd(), &[("XOF", 600.0)]);

        let rate = resolver(Duration::from_secs(20))
            .resolve(&provider, &PairKey::new("ABC", "XOF"))
            .await
            .unwrap();

        assert_eq!(rate.price, 6000.0);
        assert_eq!(rate.derivation, Derivation::Cross);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inverted_bridge_when_table_lacks_quote() {
        let provider = MockPriceProvider::new("test");
        provider.set_spot(PairKey::new("ABC", "USD"), 10.0);
        provider.set_spot(PairKey::new("XOF", "USD"), 0.002);
        provider.set_table(CurrencyCode::usd(), &[("EUR", 0.92)]);

        let rate = resolver(Duration::from_secs(20))
            .resolve(&provider, &PairKey::new("ABC", "XOF"))
            .await
            .unwrap();

        assert!((rate.price - 5000.0).abs() < 1e-6);
        assert_eq!(rate.derivation, Derivation::Inverted);
        // The base leg is reused, not fetched twice.
        assert_eq!(provider.spot_calls(&PairKey::new("ABC", "USD")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_currency_legs_need_no_fetch() {
        let provider = MockPriceProvider::new("test");
        provider.set_table(CurrencyCode::usd(), &[("XOF", 600.0)]);

        let rate = resolver(Duration::from_secs(20))
            .resolve(&provider, &PairKey::new("USD", "XOF"))
            .await
            .unwrap();

        assert_eq!(rate.price, 600.0);
        assert_eq!(provider.spot_calls(&PairKey::new("USD", "USD")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_strategies_fail() {
        let provider = MockPriceProvider::new("test");
        provider.set_spot(PairKey::new("ABC", "USD"), 10.0);
        provider.set_table_result(
            CurrencyCode::usd(),
            ProviderCallResult::TransientError("HTTP 500".into()),
        );

        let result = resolver(Duration::from_secs(20))
            .resolve(&provider, &PairKey::new("ABC", "XOF"))
            .await;

        assert_eq!(result, Err(FetchError::Unsupported));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_base_leg_is_not_fetched_again() {
        let provider = MockPriceProvider::new("test");
        let base_leg = PairKey::new("ABC", "USD");
        provider.script_spot(
            base_leg.clone(),
            vec![ProviderCallResult::TransientError("HTTP 503".into())],
        );
        provider.set_spot(PairKey::new("XOF", "USD"), 0.002);

        let result = resolver(Duration::from_secs(20))
            .resolve(&provider, &PairKey::new("ABC", "XOF"))
            .await;

        assert_eq!(
            result,
            Err(FetchError::Failed {
                attempts: 3,
                last: FailureClass::Transient("HTTP 503".into()),
            })
        );
        assert_eq!(provider.spot_calls(&base_leg), 3);
        assert_eq!(provider.spot_calls(&PairKey::new("XOF", "USD")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_leg_times_out() {
        let provider = MockPriceProvider::new("slow").with_latency(Duration::from_secs(5));
        provider.set_spot(PairKey::new("ABC", "USD"), 10.0);
        provider.set_table(CurrencyCode::usd(), &[("XOF", 600.0)]);

        let result = resolver(Duration::from_secs(2))
            .resolve(&provider, &PairKey::new("ABC", "XOF"))
            .await;

        assert_eq!(result, Err(FetchError::TimedOut(Duration::from_secs(2))));
    }
}
