//! Pricing engine error types.

use std::fmt;
use std::time::Duration;

use quotedesk_common::{PairFormatError, PairKey};
use thiserror::Error;

/// Why the last provider call of a failed fetch did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureClass {
    /// The provider throttled us.
    RateLimited { retry_after: Option<Duration> },
    /// Timeout, 5xx, connection failure or malformed payload.
    Transient(String),
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::RateLimited {
                retry_after: Some(wait),
            } => write!(f, "rate limited (retry after {}ms)", wait.as_millis()),
            FailureClass::RateLimited { retry_after: None } => write!(f, "rate limited"),
            FailureClass::Transient(cause) => write!(f, "transient error: {cause}"),
        }
    }
}

/// Failure of a single fetch leg. Internal to the engine: callers only ever
/// see [`PricingError`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The provider has no data for this pair or currency.
    #[error("Not supported by provider")]
    Unsupported,

    /// Retries exhausted.
    #[error("Fetch failed after {attempts} attempt(s): {last}")]
    Failed { attempts: u32, last: FailureClass },

    /// The leg did not complete within its timeout.
    #[error("Fetch timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Errors surfaced by the price service.
///
/// `Clone` so that a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    /// Malformed pair string, rejected before any I/O.
    #[error(transparent)]
    InvalidPairFormat(#[from] PairFormatError),

    /// Conversion amount is negative or not a number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Every direct and fallback strategy failed and nothing is cached.
    #[error("Price unavailable for {pair}")]
    PriceUnavailable { pair: PairKey },

    /// The caller's deadline elapsed before the shared fetch completed.
    #[error("Deadline of {deadline_ms}ms exceeded for {pair}")]
    DeadlineExceeded { pair: PairKey, deadline_ms: u64 },

    /// Invalid configuration or provider setup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The fetch task died without producing a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PricingError {
    /// Whether asking again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PricingError::PriceUnavailable { .. }
                | PricingError::DeadlineExceeded { .. }
                | PricingError::Internal(_)
        )
    }

    /// Stable error code for the outer API layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            PricingError::InvalidPairFormat(_) => "INVALID_PAIR_FORMAT",
            PricingError::InvalidAmount(_) => "INVALID_AMOUNT",
            PricingError::PriceUnavailable { .. } => "PRICE_UNAVAILABLE",
            PricingError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            PricingError::Configuration(_) => "CONFIGURATION_ERROR",
            PricingError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type for pricing operations.
pub type PricingResult<T> = Result<T, PricingError>;
