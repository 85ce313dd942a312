//! CoinGecko public API.

use async_trait::async_trait;
use quotedesk_common::{CurrencyCode, PairKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, get_json, positive_price};
use super::{PriceProvider, ProviderCallResult, RateTable};
use crate::error::PricingResult;

/// Public CoinGecko v3 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Symbols CoinGecko can price, with their coin ids.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("MATIC", "matic-network"),
    ("LTC", "litecoin"),
];

/// `/simple/price` body: coin id -> vs currency -> price.
type SimplePrice = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    rates: HashMap<String, BtcRate>,
}

#[derive(Debug, Deserialize)]
struct BtcRate {
    value: f64,
}

fn coin_id(symbol: &CurrencyCode) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(code, _)| *code == symbol.as_str())
        .map(|(_, id)| *id)
}

fn pick_price(body: &SimplePrice, id: &str, vs_currency: &str) -> ProviderCallResult<f64> {
    match body.get(id).and_then(|prices| prices.get(vs_currency)) {
        Some(price) => positive_price(*price),
        None => ProviderCallResult::Unsupported,
    }
}

/// Rebase the BTC-denominated table onto `base`.
fn rebase(body: ExchangeRates, base: &CurrencyCode) -> ProviderCallResult<RateTable> {
    let base_key = base.as_str().to_lowercase();
    let base_value = match body.rates.get(&base_key) {
        Some(rate) if rate.value.is_finite() && rate.value > 0.0 => rate.value,
        _ => return ProviderCallResult::Unsupported,
    };

    let table = body
        .rates
        .into_iter()
        .filter(|(_, rate)| rate.value.is_finite() && rate.value > 0.0)
        .map(|(code, rate)| (CurrencyCode::new(code), rate.value / base_value))
        .collect();
    ProviderCallResult::Ok(table)
}

/// Spot prices from `/simple/price`, rate tables from `/exchange_rates`.
pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    /// Create a provider against `base_url`, each request bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PricingResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_spot(&self, pair: &PairKey) -> ProviderCallResult<f64> {
        let Some(id) = coin_id(pair.base()) else {
            return ProviderCallResult::Unsupported;
        };
        let vs_currency = pair.quote().as_str().to_lowercase();
        debug!(provider = self.name(), pair = %pair, coin = id, "Fetching spot price");

        let request = self
            .client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", id), ("vs_currencies", vs_currency.as_str())]);

        get_json::<SimplePrice>(request)
            .await
            .and_then(|body| pick_price(&body, id, &vs_currency))
    }

    async fn fetch_rate_table(&self, base: &CurrencyCode) -> ProviderCallResult<RateTable> {
        debug!(provider = self.name(), base = %base, "Fetching rate table");

        get_json::<ExchangeRates>(self.client.get(format!("{}/exchange_rates", self.base_url)))
            .await
            .and_then(|body| rebase(body, base))
    }
}
