//! Platform margins applied on top of the market price.

use serde::{Deserialize, Serialize};

/// Buy discount and sell markup, as fractions of the market price.
///
/// The platform buys below market (`market * (1 - buy_discount)`) and sells
/// above it (`market * (1 + sell_markup)`). No per-currency special cases:
/// rounding belongs to the response formatter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginPolicy {
    /// Discount applied when a customer sells to the platform.
    pub buy_discount: f64,
    /// Markup applied when a customer buys from the platform.
    pub sell_markup: f64,
}

impl Default for MarginPolicy {
    fn default() -> Self {
        Self {
            buy_discount: 0.005,
            sell_markup: 0.03,
        }
    }
}

impl MarginPolicy {
    /// Create a policy from explicit fractions.
    pub fn new(buy_discount: f64, sell_markup: f64) -> Self {
        Self {
            buy_discount,
            sell_markup,
        }
    }

    /// Compute `(buy, sell)` platform prices for a market price.
    pub fn apply(&self, market_price: f64) -> (f64, f64) {
        let buy = market_price * (1.0 - self.buy_discount);
        let sell = market_price * (1.0 + self.sell_markup);
        (buy, sell)
    }

    /// Reject fractions that would break `buy <= market <= sell`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.buy_discount.is_finite() || !(0.0..1.0).contains(&self.buy_discount) {
            return Err(format!(
                "Buy discount must be in [0, 1), got {}",
                self.buy_discount
            ));
        }

        if !self.sell_markup.is_finite() || self.sell_markup < 0.0 {
            return Err(format!(
                "Sell markup must be non-negative, got {}",
                self.sell_markup
            ));
        }

        Ok(())
    }
}
