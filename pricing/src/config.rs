//! Price service configuration.

use quotedesk_common::CurrencyCode;
use std::time::Duration;

use crate::margin::MarginPolicy;
use crate::retry::RetryPolicy;

/// Configuration for the price service.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// How long a resolved quote is served without refetching.
    pub cache_ttl: Duration,
    /// Longest a caller waits on an uncached resolution.
    pub deadline: Duration,
    /// Timeout for a single provider call.
    pub request_timeout: Duration,
    /// Timeout for one cross-rate leg, retries included.
    pub leg_timeout: Duration,
    /// Maximum resolutions talking to providers at once.
    pub max_concurrent: usize,
    /// Currency every cross rate is routed through.
    pub bridge_currency: CurrencyCode,
    /// Decimal places in caller-facing prices.
    pub display_decimals: u32,
    /// Platform margins.
    pub margin: MarginPolicy,
    /// Retry budget per provider call.
    pub retry: RetryPolicy,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            deadline: Duration::from_secs(15),
            request_timeout: Duration::from_secs(8),
            leg_timeout: Duration::from_secs(20),
            max_concurrent: 6,
            bridge_currency: CurrencyCode::usd(),
            display_decimals: 6,
            margin: MarginPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PricingConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl.is_zero() {
            return Err("Cache TTL must be greater than zero".to_string());
        }

        if self.deadline.is_zero() {
            return Err("Deadline must be greater than zero".to_string());
        }

        if self.request_timeout.is_zero() || self.leg_timeout.is_zero() {
            return Err("Request and leg timeouts must be greater than zero".to_string());
        }

        if self.max_concurrent == 0 {
            return Err("Max concurrent resolutions must be at least 1".to_string());
        }

        if self.bridge_currency.as_str().is_empty() {
            return Err("Bridge currency cannot be empty".to_string());
        }

        // rust_decimal supports at most 28 fractional digits.
        if self.display_decimals > 28 {
            return Err(format!(
                "Display decimals must be at most 28, got {}",
                self.display_decimals
            ));
        }

        self.margin.validate()?;
        self.retry.validate()?;

        Ok(())
    }
}
