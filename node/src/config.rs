//! Node configuration.

use std::str::FromStr;
use std::time::Duration;

use quotedesk_common::{CurrencyCode, PairKey};
use quotedesk_pricing::provider::{coinbase, coingecko};
use quotedesk_pricing::{PrewarmConfig, PricingConfig};
use tracing::warn;

/// Provider names the node knows how to build.
pub const KNOWN_PROVIDERS: &[&str] = &["coinbase", "coingecko"];

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node ID; generated when absent.
    pub node_id: Option<String>,
    /// Providers in priority order.
    pub providers: Vec<String>,
    /// Coinbase API base URL.
    pub coinbase_url: String,
    /// CoinGecko API base URL.
    pub coingecko_url: String,
    /// Engine configuration.
    pub pricing: PricingConfig,
    /// Background refresh configuration.
    pub prewarm: PrewarmConfig,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            providers: vec!["coinbase".to_string()],
            coinbase_url: coinbase::DEFAULT_BASE_URL.to_string(),
            coingecko_url: coingecko::DEFAULT_BASE_URL.to_string(),
            pricing: PricingConfig::default(),
            prewarm: PrewarmConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key-value source. Values that fail to
    /// parse are logged and the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(providers) = var("QUOTE_PROVIDERS") {
            config.providers = providers
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
        }

        if let Some(url) = var("COINBASE_API_URL") {
            config.coinbase_url = url;
        }

        if let Some(url) = var("COINGECKO_API_URL") {
            config.coingecko_url = url;
        }

        if let Some(pairs) = var("QUOTE_PREWARM_PAIRS") {
            config.prewarm.pairs = parse_pair_list(&pairs);
        }

        if let Some(secs) = parse_var::<u64>(&var, "QUOTE_REFRESH_INTERVAL_SECS") {
            config.prewarm.refresh_interval = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_var::<u64>(&var, "QUOTE_PREWARM_PAUSE_MS") {
            config.prewarm.pause = Duration::from_millis(ms);
        }

        let pricing = &mut config.pricing;

        if let Some(max) = parse_var(&var, "QUOTE_MAX_CONCURRENT") {
            pricing.max_concurrent = max;
        }

        if let Some(ms) = parse_var::<u64>(&var, "QUOTE_REQUEST_TIMEOUT_MS") {
            pricing.request_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&var, "QUOTE_LEG_TIMEOUT_MS") {
            pricing.leg_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&var, "QUOTE_DEADLINE_MS") {
            pricing.deadline = Duration::from_millis(ms);
        }

        if let Some(attempts) = parse_var(&var, "QUOTE_MAX_ATTEMPTS") {
            pricing.retry.max_attempts = attempts;
        }

        if let Some(ms) = parse_var::<u64>(&var, "QUOTE_RETRY_BASE_MS") {
            pricing.retry.base_delay = Duration::from_millis(ms);
        }

        if let Some(discount) = parse_var(&var, "QUOTE_BUY_DISCOUNT") {
            pricing.margin.buy_discount = discount;
        }

        if let Some(markup) = parse_var(&var, "QUOTE_SELL_MARKUP") {
            pricing.margin.sell_markup = markup;
        }

        if let Some(secs) = parse_var::<u64>(&var, "QUOTE_CACHE_TTL_SECS") {
            pricing.cache_ttl = Duration::from_secs(secs);
        }

        if let Some(bridge) = var("QUOTE_BRIDGE_CURRENCY") {
            pricing.bridge_currency = CurrencyCode::new(bridge.trim());
        }

        if let Some(decimals) = parse_var(&var, "QUOTE_DISPLAY_DECIMALS") {
            pricing.display_decimals = decimals;
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Filter directives for the subscriber. An explicit `RUST_LOG` value
    /// takes precedence over `log_level`.
    pub fn log_filter(&self, rust_log: Option<String>) -> String {
        rust_log
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.log_level.clone())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.providers.is_empty() {
            return Err("At least one provider must be configured".to_string());
        }

        if let Some(unknown) = self
            .providers
            .iter()
            .find(|p| !KNOWN_PROVIDERS.contains(&p.as_str()))
        {
            return Err(format!(
                "Unknown provider '{unknown}', expected one of {KNOWN_PROVIDERS:?}"
            ));
        }

        self.pricing.validate()?;
        self.prewarm.validate()?;

        Ok(())
    }
}

fn parse_var<T: FromStr>(var: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}

/// Parse a comma-separated pair list, skipping malformed entries.
pub fn parse_pair_list(raw: &str) -> Vec<PairKey> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match PairKey::normalize(entry) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(entry, error = %e, "Skipping invalid warm pair");
                None
            }
        })
        .collect()
}
