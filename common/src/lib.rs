//! Quotedesk Common Types
//!
//! This crate contains the value types shared by the pricing engine and the
//! service node: currency codes, normalized currency pairs and resolved quotes.

pub mod error;
pub mod monetary;
pub mod pair;
pub mod quote;
pub mod time;

pub use error::*;
pub use monetary::*;
pub use pair::*;
pub use quote::*;
pub use time::*;
