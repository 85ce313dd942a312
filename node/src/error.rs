//! Node error types.

use quotedesk_pricing::PricingError;
use thiserror::Error;

use crate::state::NodeState;

/// Errors from node setup and lifecycle.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Cannot {action} a node in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: NodeState,
    },

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
