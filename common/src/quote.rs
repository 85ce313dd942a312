//! Resolved price quotes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QuoteError;
use crate::pair::PairKey;
use crate::time::{now, Timestamp};

/// How a market price was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Derivation {
    /// Quoted by the provider for the pair itself.
    Direct,
    /// Base priced in the bridge currency, then converted with the bridge rate table.
    Cross,
    /// Bridge rate obtained by inverting the quote currency's own bridge price.
    Inverted,
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Derivation::Direct => "direct",
            Derivation::Cross => "cross",
            Derivation::Inverted => "inverted",
        };
        f.write_str(label)
    }
}

/// A market price for one pair plus the platform's margin-adjusted prices.
///
/// Only ever built with a finite, strictly positive market price; a failed
/// resolution yields an error, never a `Quote`. Deserialization applies the
/// same check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QuoteRecord")]
pub struct Quote {
    pair: PairKey,
    market_price: f64,
    buy_price_for_platform: f64,
    sell_price_for_platform: f64,
    resolved_at: Timestamp,
    source: String,
    derivation: Derivation,
}

impl Quote {
    /// Create a quote resolved now.
    pub fn try_new(
        pair: PairKey,
        market_price: f64,
        buy_price_for_platform: f64,
        sell_price_for_platform: f64,
        source: impl Into<String>,
        derivation: Derivation,
    ) -> Result<Self, QuoteError> {
        QuoteRecord {
            pair,
            market_price,
            buy_price_for_platform,
            sell_price_for_platform,
            resolved_at: now(),
            source: source.into(),
            derivation,
        }
        .try_into()
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn market_price(&self) -> f64 {
        self.market_price
    }

    /// Price the platform pays when a customer sells the base currency to it.
    pub fn buy_price_for_platform(&self) -> f64 {
        self.buy_price_for_platform
    }

    /// Price the platform charges when a customer buys the base currency from it.
    pub fn sell_price_for_platform(&self) -> f64 {
        self.sell_price_for_platform
    }

    pub fn resolved_at(&self) -> Timestamp {
        self.resolved_at
    }

    /// Name of the provider that supplied the market price.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn derivation(&self) -> Derivation {
        self.derivation
    }
}

/// Wire shape of a [`Quote`], validated on the way in.
#[derive(Deserialize)]
struct QuoteRecord {
    pair: PairKey,
    market_price: f64,
    buy_price_for_platform: f64,
    sell_price_for_platform: f64,
    resolved_at: Timestamp,
    source: String,
    derivation: Derivation,
}

impl TryFrom<QuoteRecord> for Quote {
    type Error = QuoteError;

    fn try_from(record: QuoteRecord) -> Result<Self, Self::Error> {
        if !record.market_price.is_finite() || record.market_price <= 0.0 {
            return Err(QuoteError::NonPositivePrice(record.market_price));
        }

        Ok(Self {
            pair: record.pair,
            market_price: record.market_price,
            buy_price_for_platform: record.buy_price_for_platform,
            sell_price_for_platform: record.sell_price_for_platform,
            resolved_at: record.resolved_at,
            source: record.source,
            derivation: record.derivation,
        })
    }
}
