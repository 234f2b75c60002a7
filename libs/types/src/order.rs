//! Order input types
//!
//! An order is immutable once received by the risk engine. Notional is
//! derived from quantity and price on demand and never stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::OrderError;
use crate::ids::{OrderId, UserId};
use crate::numeric::{Price, Quantity};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (adds exposure)
    BUY,
    /// Sell order (reduces exposure)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    /// Direction applied to exposure: +1 for BUY, -1 for SELL
    pub fn sign(&self) -> Decimal {
        match self {
            Side::BUY => Decimal::ONE,
            Side::SELL => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::BUY => "BUY",
            Side::SELL => "SELL",
        }
    }
}

/// Execution style requested by the caller
///
/// Carried for audit and publication; risk rules do not branch on it.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    MARKET,
    LIMIT,
    STOP,
    STOP_LIMIT,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::MARKET => "MARKET",
            OrderType::LIMIT => "LIMIT",
            OrderType::STOP => "STOP",
            OrderType::STOP_LIMIT => "STOP_LIMIT",
        }
    }
}

/// Inbound trade order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: String,
    pub side: Side,
    pub quantity: Quantity,
    pub price: Price,
    pub order_type: OrderType,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Order {
    /// Create an order stamped with the current time
    pub fn new(
        order_id: impl Into<OrderId>,
        user_id: impl Into<UserId>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Quantity,
        price: Price,
        order_type: OrderType,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            user_id: user_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            order_type,
            timestamp: Utc::now(),
        }
    }

    /// Dollar value of the order: `quantity × price`
    ///
    /// Saturates at `Decimal::MAX` when the product is not representable.
    pub fn notional(&self) -> Decimal {
        self.quantity
            .as_decimal()
            .checked_mul(self.price.as_decimal())
            .unwrap_or(Decimal::MAX)
    }

    /// Notional signed by side, the delta this order applies to exposure
    pub fn signed_notional(&self) -> Decimal {
        self.side.sign() * self.notional()
    }

    /// Check caller-side field requirements.
    ///
    /// Price and quantity positivity is enforced by their types; this
    /// covers the string fields.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_id.as_str().trim().is_empty() {
            return Err(OrderError::MissingField { field: "order_id" });
        }
        if self.user_id.as_str().trim().is_empty() {
            return Err(OrderError::MissingField { field: "user_id" });
        }
        if self.symbol.trim().is_empty() {
            return Err(OrderError::MissingField { field: "symbol" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_order(side: Side, qty: &str, price: &str) -> Order {
        Order::new(
            "test-order",
            "user1",
            "ETH-USD",
            side,
            Quantity::from_str(qty).unwrap(),
            Price::from_str(price).unwrap(),
            OrderType::LIMIT,
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::BUY.opposite(), Side::SELL);
        assert_eq!(Side::SELL.opposite(), Side::BUY);
    }

    #[test]
    fn test_notional() {
        let order = make_order(Side::BUY, "0.5", "25000");
        assert_eq!(order.notional(), Decimal::from(12_500));
    }

    #[test]
    fn test_notional_saturates_instead_of_overflowing() {
        let buy = make_order(Side::BUY, "100000000000000000000", "10000000000");
        assert_eq!(buy.notional(), Decimal::MAX);

        let sell = make_order(Side::SELL, "100000000000000000000", "10000000000");
        assert_eq!(sell.signed_notional(), Decimal::MIN);
    }

    #[test]
    fn test_signed_notional_by_side() {
        let buy = make_order(Side::BUY, "2", "1500");
        let sell = make_order(Side::SELL, "2", "1500");
        assert_eq!(buy.signed_notional(), Decimal::from(3_000));
        assert_eq!(sell.signed_notional(), Decimal::from(-3_000));
    }

    #[test]
    fn test_validate_blank_fields() {
        let mut order = make_order(Side::BUY, "1", "100");
        assert!(order.validate().is_ok());

        order.symbol = "  ".to_string();
        assert_eq!(
            order.validate(),
            Err(OrderError::MissingField { field: "symbol" })
        );

        order.user_id = UserId::new("");
        assert_eq!(
            order.validate(),
            Err(OrderError::MissingField { field: "user_id" })
        );
    }

    #[test]
    fn test_order_type_wire_names() {
        let json = serde_json::to_string(&OrderType::STOP_LIMIT).unwrap();
        assert_eq!(json, "\"STOP_LIMIT\"");
        assert_eq!(OrderType::MARKET.as_str(), "MARKET");
    }

    #[test]
    fn test_order_deserialization_without_timestamp() {
        let json = r#"{
            "order_id": "o-1",
            "user_id": "user1",
            "symbol": "BTC-USD",
            "side": "SELL",
            "quantity": "0.2",
            "price": "50000",
            "order_type": "MARKET"
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.side, Side::SELL);
        assert_eq!(order.notional(), Decimal::from(10_000));
    }

    #[test]
    fn test_order_deserialization_rejects_zero_price() {
        let json = r#"{
            "order_id": "o-1",
            "user_id": "user1",
            "symbol": "BTC-USD",
            "side": "BUY",
            "quantity": "1",
            "price": "0",
            "order_type": "LIMIT"
        }"#;
        assert!(serde_json::from_str::<Order>(json).is_err());
    }
}
