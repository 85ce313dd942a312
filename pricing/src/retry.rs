//! Bounded retries with exponential backoff around provider calls.

use std::future::Future;
use std::time::Duration;

use quotedesk_common::{CurrencyCode, PairKey};
use tracing::{debug, warn};

use crate::error::{FailureClass, FetchError};
use crate::provider::{PriceProvider, ProviderCallResult, RateTable};

/// Longest single wait on a rate-limit answer.
const MAX_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Retry budget for a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound for the transient backoff.
    pub max_delay: Duration,
    /// Wait used when a rate-limit answer carries no hint; doubles per hit.
    pub rate_limit_backoff: Duration,
    /// Total time a fetch may spend waiting on rate limits.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th transient failure.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    /// Wait after the `hits`-th rate-limit answer.
    pub fn rate_limit_wait(&self, hint: Option<Duration>, hits: u32) -> Duration {
        let wait = match hint {
            Some(wait) => wait,
            None => {
                let exponent = hits.saturating_sub(1).min(16);
                self.rate_limit_backoff.saturating_mul(1 << exponent)
            }
        };
        wait.min(MAX_RATE_LIMIT_BACKOFF)
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("Max attempts must be at least 1".to_string());
        }

        if self.base_delay > self.max_delay {
            return Err("Retry base delay cannot exceed max delay".to_string());
        }

        Ok(())
    }
}

/// Runs provider calls under a [`RetryPolicy`] and a per-call timeout.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RetryingFetcher {
    /// Create a fetcher.
    pub fn new(policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            policy,
            call_timeout,
        }
    }

    /// Fetch a spot price, retrying transient failures and rate limits.
    ///
    /// `Unsupported` returns at once: retrying cannot change provider support.
    pub async fn fetch_with_retry(
        &self,
        provider: &dyn PriceProvider,
        pair: &PairKey,
    ) -> Result<f64, FetchError> {
        let resource = pair.to_string();
        self.run(provider.name(), &resource, move || provider.fetch_spot(pair))
            .await
    }

    /// Fetch a rate table under the same policy.
    pub async fn fetch_table_with_retry(
        &self,
        provider: &dyn PriceProvider,
        base: &CurrencyCode,
    ) -> Result<RateTable, FetchError> {
        let resource = format!("{base} rates");
        self.run(provider.name(), &resource, move || provider.fetch_rate_table(base))
            .await
    }

    async fn run<T, F, Fut>(&self, provider: &str, resource: &str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderCallResult<T>>,
    {
        let mut calls = 0u32;
        let mut transient_failures = 0u32;
        let mut rate_limit_hits = 0u32;
        let mut rate_limited_for = Duration::ZERO;

        loop {
            calls += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => ProviderCallResult::TransientError(format!(
                    "call timed out after {}ms",
                    self.call_timeout.as_millis()
                )),
            };

            match outcome {
                ProviderCallResult::Ok(value) => return Ok(value),
                ProviderCallResult::Unsupported => {
                    debug!(provider, resource, "Not supported by provider");
                    return Err(FetchError::Unsupported);
                }
                ProviderCallResult::RateLimited(hint) => {
                    rate_limit_hits += 1;
                    let wait = self.policy.rate_limit_wait(hint, rate_limit_hits);

                    if rate_limited_for + wait > self.policy.max_rate_limit_wait {
                        warn!(
                            provider,
                            resource,
                            waited_ms = rate_limited_for.as_millis() as u64,
                            "Rate limit wait ceiling reached"
                        );
                        return Err(FetchError::Failed {
                            attempts: calls,
                            last: FailureClass::RateLimited { retry_after: hint },
                        });
                    }

                    rate_limited_for += wait;
                    debug!(
                        provider,
                        resource,
                        delay_ms = wait.as_millis() as u64,
                        hinted = hint.is_some(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                ProviderCallResult::TransientError(cause) => {
                    transient_failures += 1;

                    if transient_failures >= self.policy.max_attempts {
                        warn!(
                            provider,
                            resource,
                            attempts = calls,
                            error = %cause,
                            "Retries exhausted"
                        );
                        return Err(FetchError::Failed {
                            attempts: calls,
                            last: FailureClass::Transient(cause),
                        });
                    }

                    let delay = self.policy.backoff_for(transient_failures);
                    debug!(
                        provider,
                        resource,
                        attempt = transient_failures,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockPriceProvider;
    use tokio::time::Instant;

    fn fetcher() -> RetryingFetcher {
        RetryingFetcher::new(RetryPolicy::default(), Duration::from_secs(8))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for(1), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(600));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1200));
        assert_eq!(policy.backoff_for(30), Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limit_wait_prefers_hint() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.rate_limit_wait(Some(Duration::from_secs(7)), 3),
            Duration::from_secs(7)
        );
        assert_eq!(policy.rate_limit_wait(None, 1), Duration::from_secs(1));
        assert_eq!(policy.rate_limit_wait(None, 3), Duration::from_secs(4));
        assert_eq!(policy.rate_limit_wait(None, 12), MAX_RATE_LIMIT_BACKOFF);
        assert_eq!(
            policy.rate_limit_wait(Some(Duration::from_secs(600)), 1),
            MAX_RATE_LIMIT_BACKOFF
        );
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());

        let zero = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_until_success() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("BTC", "USD");
        provider.script_spot(
            pair.clone(),
            vec![
                ProviderCallResult::TransientError("HTTP 502".into()),
                ProviderCallResult::TransientError("HTTP 503".into()),
                ProviderCallResult::Ok(64000.0),
            ],
        );

        let start = Instant::now();
        let price = fetcher().fetch_with_retry(&provider, &pair).await.unwrap();

        assert_eq!(price, 64000.0);
        assert_eq!(provider.spot_calls(&pair), 3);
        // 300ms then 600ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_report_last_failure() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("BTC", "USD");
        provider.script_spot(
            pair.clone(),
            vec![ProviderCallResult::TransientError("HTTP 500".into())],
        );

        let result = fetcher().fetch_with_retry(&provider, &pair).await;

        assert_eq!(
            result,
            Err(FetchError::Failed {
                attempts: 3,
                last: FailureClass::Transient("HTTP 500".into()),
            })
        );
        assert_eq!(provider.spot_calls(&pair), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_not_retried() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("XYZ", "USD");

        let result = fetcher().fetch_with_retry(&provider, &pair).await;

        assert_eq!(result, Err(FetchError::Unsupported));
        assert_eq!(provider.spot_calls(&pair), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_honored() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("USDT", "XOF");
        provider.script_spot(
            pair.clone(),
            vec![
                ProviderCallResult::RateLimited(Some(Duration::from_secs(2))),
                ProviderCallResult::Ok(600.0),
            ],
        );

        let start = Instant::now();
        let price = fetcher().fetch_with_retry(&provider, &pair).await.unwrap();

        assert_eq!(price, 600.0);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_do_not_consume_attempts() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("ETH", "USD");
        provider.script_spot(
            pair.clone(),
            vec![
                ProviderCallResult::RateLimited(None),
                ProviderCallResult::RateLimited(None),
                ProviderCallResult::RateLimited(None),
                ProviderCallResult::TransientError("HTTP 502".into()),
                ProviderCallResult::TransientError("HTTP 502".into()),
                ProviderCallResult::Ok(3100.0),
            ],
        );

        let price = fetcher().fetch_with_retry(&provider, &pair).await;

        tokio_test::assert_ok!(price);
        assert_eq!(provider.spot_calls(&pair), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_ceiling() {
        let provider = MockPriceProvider::new("test");
        let pair = PairKey::new("ETH", "USD");
        provider.script_spot(
            pair.clone(),
            vec![ProviderCallResult::RateLimited(Some(Duration::from_secs(20)))],
        );

        let start = Instant::now();
        let result = fetcher().fetch_with_retry(&provider, &pair).await;

        // 20s fits under the 30s ceiling, a second 20s does not.
        assert_eq!(
            result,
            Err(FetchError::Failed {
                attempts: 2,
                last: FailureClass::RateLimited {
                    retry_after: Some(Duration::from_secs(20)),
                },
            })
        );
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(start.elapsed() < Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_counts_as_transient() {
        let provider = MockPriceProvider::new("slow").with_latency(Duration::from_secs(5));
        let pair = PairKey::new("BTC", "USD");
        provider.set_spot(pair.clone(), 64000.0);

        let fetcher = RetryingFetcher::new(RetryPolicy::default(), Duration::from_secs(1));
        let result = fetcher.fetch_with_retry(&provider, &pair).await;

        assert!(matches!(
            result,
            Err(FetchError::Failed {
                attempts: 3,
                last: FailureClass::Transient(_),
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_fetch() {
        let provider = MockPriceProvider::new("test");
        provider.set_table(CurrencyCode::usd(), &[("XOF", 600.0)]);

        let table = fetcher()
            .fetch_table_with_retry(&provider, &CurrencyCode::usd())
            .await
            .unwrap();

        assert_eq!(table.get(&CurrencyCode::new("XOF")), Some(&600.0));
    }
}
