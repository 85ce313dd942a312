//! Currency pair keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PairFormatError;
use crate::monetary::CurrencyCode;

/// A normalized currency pair, canonically written `BASE-QUOTE`.
///
/// A degenerate pair (`USD-USD`) is accepted here; rejecting it is the
/// caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairKey {
    base: CurrencyCode,
    quote: CurrencyCode,
}

impl PairKey {
    /// Create a pair from two currency codes.
    pub fn new(base: impl Into<CurrencyCode>, quote: impl Into<CurrencyCode>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse a raw pair string.
    ///
    /// Whitespace is dropped, letters are uppercased and `_` / `/` are read
    /// as `-`. Exactly one separator with a non-empty code on each side is
    /// required: `"usdt_xof"`, `" USDT/XOF "` and `"USDT-XOF"` are the same pair.
    pub fn normalize(raw: &str) -> Result<Self, PairFormatError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '_' | '/' => '-',
                other => other,
            })
            .collect::<String>()
            .to_uppercase();

        let mut sides = cleaned.split('-');
        match (sides.next(), sides.next(), sides.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => Ok(Self {
                base: CurrencyCode::new(base),
                quote: CurrencyCode::new(quote),
            }),
            _ => Err(PairFormatError::InvalidPairFormat(raw.to_string())),
        }
    }

    /// Base currency (the unit being priced).
    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// Quote currency (the pricing unit).
    pub fn quote(&self) -> &CurrencyCode {
        &self.quote
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for PairKey {
    type Err = PairFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for PairKey {
    type Error = PairFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

impl From<PairKey> for String {
    fn from(pair: PairKey) -> Self {
        pair.to_string()
    }
}
