//! Coinbase public prices API.

use async_trait::async_trait;
use quotedesk_common::{CurrencyCode, PairKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, get_json, positive_price};
use super::{PriceProvider, ProviderCallResult, RateTable};
use crate::error::PricingResult;

/// Public Coinbase v2 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.coinbase.com/v2";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct RatesData {
    rates: HashMap<String, String>,
}

/// Spot prices from `/prices/{pair}/spot`, rate tables from `/exchange-rates`.
pub struct CoinbaseProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CoinbaseProvider {
    /// Create a provider against `base_url`, each request bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PricingResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn spot_url(&self, pair: &PairKey) -> String {
        format!(
            "{}/prices/{}/spot",
            self.base_url,
            urlencoding::encode(&pair.to_string())
        )
    }
}

fn parse_spot(data: SpotData) -> ProviderCallResult<f64> {
    match data.amount.trim().parse::<f64>() {
        Ok(amount) => positive_price(amount),
        Err(_) => ProviderCallResult::TransientError(format!(
            "malformed payload: amount {:?}",
            data.amount
        )),
    }
}

fn parse_rates(data: RatesData) -> RateTable {
    data.rates
        .into_iter()
        .filter_map(|(code, rate)| {
            let rate = rate.trim().parse::<f64>().ok()?;
            (rate.is_finite() && rate > 0.0).then(|| (CurrencyCode::new(code), rate))
        })
        .collect()
}

#[async_trait]
impl PriceProvider for CoinbaseProvider {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn fetch_spot(&self, pair: &PairKey) -> ProviderCallResult<f64> {
        let url = self.spot_url(pair);
        debug!(provider = self.name(), pair = %pair, "Fetching spot price");

        get_json::<Envelope<SpotData>>(self.client.get(&url))
            .await
            .and_then(|envelope| parse_spot(envelope.data))
    }

    async fn fetch_rate_table(&self, base: &CurrencyCode) -> ProviderCallResult<RateTable> {
        let request = self
            .client
            .get(format!("{}/exchange-rates", self.base_url))
            .query(&[("currency", base.as_str())]);
        debug!(provider = self.name(), base = %base, "Fetching rate table");

        get_json::<Envelope<RatesData>>(request)
            .await
            .map(|envelope| parse_rates(envelope.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spot_payload() {
        let body = r#"{"data":{"amount":"67012.55","base":"BTC","currency":"USD"}}"#;
        let envelope: Envelope<SpotData> = serde_json::from_str(body).unwrap();

        assert_eq!(parse_spot(envelope.data), ProviderCallResult::Ok(67012.55));
    }

    #[test]
    fn test_parse_spot_rejects_garbage() {
        let bad = SpotData {
            amount: "n/a".into(),
        };
        assert!(matches!(
            parse_spot(bad),
            ProviderCallResult::TransientError(_)
        ));

        let zero = SpotData {
            amount: "0".into(),
        };
        assert!(matches!(
            parse_spot(zero),
            ProviderCallResult::TransientError(_)
        ));
    }

    #[test]
    fn test_parse_rates_skips_unparseable_entries() {
        let body = r#"{"data":{"currency":"USD","rates":{"XOF":"600.25","EUR":"0.92","BAD":"x","NIL":"0"}}}"#;
        let envelope: Envelope<RatesData> = serde_json::from_str(body).unwrap();
        let table = parse_rates(envelope.data);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&CurrencyCode::new("XOF")), Some(&600.25));
        assert_eq!(table.get(&CurrencyCode::new("EUR")), Some(&0.92));
    }

    #[test]
    fn test_spot_url() {
        let provider =
            CoinbaseProvider::new("https://api.example.com/v2/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            provider.spot_url(&PairKey::new("USDT", "XOF")),
            "https://api.example.com/v2/prices/USDT-XOF/spot"
        );
    }
}
