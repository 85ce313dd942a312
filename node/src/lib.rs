//! Quotedesk Node
//!
//! Hosts the price service for the surrounding API layer: builds the
//! configured providers, keeps hot pairs warm and manages shutdown.

pub mod config;
pub mod error;
pub mod node;
pub mod state;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use node::QuoteNode;
pub use state::NodeState;
