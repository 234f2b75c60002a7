//! Types library for the order risk-gating engine
//!
//! Shared definitions consumed by the risk engine and its callers.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, UserId)
//! - `numeric`: Positive decimal types (Price, Quantity)
//! - `order`: Inbound order types
//! - `risk`: Verdict and assessment output
//! - `errors`: Order validation errors

pub mod ids;
pub mod numeric;
pub mod order;
pub mod risk;
pub mod errors;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::risk::*;
    pub use crate::errors::*;
}
