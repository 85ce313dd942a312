//! Caller-facing quote responses and boundary formatting.

use quotedesk_common::{Derivation, PairKey, Quote, Timestamp};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PricingError, PricingResult};

/// Which side of the trade the customer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Customer buys the base currency; priced at the platform's sell price.
    Buy,
    /// Customer sells the base currency; priced at the platform's buy price.
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(format!("Unknown direction: {other}")),
        }
    }
}

/// Optional conversion request attached to a price lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteOptions {
    pub amount: Option<f64>,
    pub direction: Option<Direction>,
}

impl QuoteOptions {
    /// Convert `amount` units of the base currency.
    pub fn amount(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Reject amounts that cannot be converted.
    pub fn validate(&self) -> PricingResult<()> {
        match self.amount {
            Some(amount) if !amount.is_finite() || amount < 0.0 => {
                Err(PricingError::InvalidAmount(amount))
            }
            _ => Ok(()),
        }
    }
}

/// Converted amount, in the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConvertedAmount {
    /// Conversion for the requested direction.
    Single(Decimal),
    /// Both conversions when no direction was given.
    Both { buy: Decimal, sell: Decimal },
}

/// Price lookup result as handed to the API layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub pair: PairKey,
    pub market_price: Decimal,
    pub buy_price_for_platform: Decimal,
    pub sell_price_for_platform: Decimal,
    pub resolved_at: Timestamp,
    /// True when served from an expired cache entry.
    pub stale: bool,
    pub source: String,
    pub derivation: Derivation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_amount: Option<ConvertedAmount>,
}

impl QuoteResponse {
    /// Format `quote` for callers, rounding every figure to `decimals` places.
    pub fn build(
        quote: &Quote,
        stale: bool,
        options: &QuoteOptions,
        decimals: u32,
    ) -> PricingResult<Self> {
        let buy = quote.buy_price_for_platform();
        let sell = quote.sell_price_for_platform();

        let converted_amount = match (options.amount, options.direction) {
            (None, _) => None,
            (Some(amount), Some(Direction::Buy)) => {
                Some(ConvertedAmount::Single(round_price(amount * sell, decimals)?))
            }
            (Some(amount), Some(Direction::Sell)) => {
                Some(ConvertedAmount::Single(round_price(amount * buy, decimals)?))
            }
            (Some(amount), None) => Some(ConvertedAmount::Both {
                buy: round_price(amount * sell, decimals)?,
                sell: round_price(amount * buy, decimals)?,
            }),
        };

        Ok(Self {
            pair: quote.pair().clone(),
            market_price: round_price(quote.market_price(), decimals)?,
            buy_price_for_platform: round_price(buy, decimals)?,
            sell_price_for_platform: round_price(sell, decimals)?,
            resolved_at: quote.resolved_at(),
            stale,
            source: quote.source().to_string(),
            derivation: quote.derivation(),
            converted_amount,
        })
    }
}

/// Round a full-precision figure for display. The only rounding in the engine.
pub fn round_price(value: f64, decimals: u32) -> PricingResult<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(decimals).normalize())
        .ok_or_else(|| PricingError::Internal(format!("Price {value} is not representable")))
}
