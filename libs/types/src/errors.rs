//! Error types for order input
//!
//! Validation errors raised before an order reaches the risk engine.

use thiserror::Error;

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidPrice("negative".to_string());
        assert_eq!(err.to_string(), "Invalid price: negative");
    }

    #[test]
    fn test_missing_field_display() {
        let err = OrderError::MissingField { field: "user_id" };
        assert_eq!(err.to_string(), "Missing required field: user_id");
    }
}
