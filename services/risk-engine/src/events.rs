//! Processed-order publication
//!
//! Every assessed order, admitted or not, is handed to an
//! [`EventPublisher`] for downstream analytics and audit. The engine makes
//! one attempt per order; failures are logged and never retried.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::order::Order;
use uuid::Uuid;

use crate::error::{PublishError, StoreError};

/// Stream key processed orders are appended to
pub const ORDERS_STREAM: &str = "orders:stream";

/// Stream message for one processed order
///
/// Scalar fields are flattened as strings; `order_data` carries the full
/// order as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub order_type: String,
    pub timestamp: String,
    pub order_data: String,
}

impl OrderEvent {
    pub fn from_order(order: &Order) -> Result<Self, PublishError> {
        Ok(Self {
            event_id: Uuid::now_v7(),
            order_id: order.order_id.to_string(),
            user_id: order.user_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side.as_str().to_string(),
            quantity: order.quantity.to_string(),
            price: order.price.to_string(),
            order_type: order.order_type.as_str().to_string(),
            timestamp: order.timestamp.to_rfc3339(),
            order_data: serde_json::to_string(order)?,
        })
    }

    /// Field/value pairs in stream order, using the consumer's field names
    pub fn stream_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("eventId", self.event_id.to_string()),
            ("orderId", self.order_id.clone()),
            ("userId", self.user_id.clone()),
            ("symbol", self.symbol.clone()),
            ("side", self.side.clone()),
            ("quantity", self.quantity.clone()),
            ("price", self.price.clone()),
            ("orderType", self.order_type.clone()),
            ("timestamp", self.timestamp.clone()),
            ("orderData", self.order_data.clone()),
        ]
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, order: &Order) -> Result<(), PublishError>;
}

/// Appends order events to a Redis stream with `XADD`
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    stream: String,
}

impl RedisStreamPublisher {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            stream: ORDERS_STREAM.to_string(),
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let event = OrderEvent::from_order(order)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream).arg("*");
        for (field, value) in event.stream_fields() {
            cmd.arg(field).arg(value);
        }

        let mut conn = self.conn.clone();
        let entry_id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;

        debug!(order_id = %order.order_id, entry_id = %entry_id, stream = %self.stream, "Published order");
        Ok(())
    }
}

/// Keeps published events in memory
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    events: Mutex<Vec<OrderEvent>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<OrderEvent> {
        self.buffer().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Events are only ever appended whole, so a poisoned buffer is still consistent
    fn buffer(&self) -> MutexGuard<'_, Vec<OrderEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| {
            warn!("Event buffer poisoned by a panicked writer, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let event = OrderEvent::from_order(order)?;
        self.buffer().push(event);
        Ok(())
    }
}
