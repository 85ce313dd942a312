//! Error types for shared value types.

use thiserror::Error;

/// A raw pair string could not be parsed into a `BASE-QUOTE` pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairFormatError {
    /// Zero or several separators, or an empty side.
    #[error("Invalid pair format: {0:?} (expected BASE-QUOTE)")]
    InvalidPairFormat(String),
}

/// A quote could not be constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// Market prices must be finite and strictly positive.
    #[error("Market price must be positive, got {0}")]
    NonPositivePrice(f64),
}
