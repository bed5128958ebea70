//! Transport-facing traits shared by every bus backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BusResult;

/// Message as stored on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Times this message has been put back after a failed delivery
    #[serde(default)]
    pub redelivered: u32,
}

impl Envelope {
    pub fn new(exchange: &str, routing_key: &str, payload: serde_json::Value) -> Self {
        Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
            timestamp: Utc::now(),
            redelivered: 0,
        }
    }
}

/// A message handed to one consumer, pending ack or requeue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Backend-specific delivery tag
    pub tag: String,
    pub envelope: Envelope,
}

/// Topic-routed, at-least-once message transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Declare a durable topic exchange. Idempotent.
    async fn declare_exchange(&self, exchange: &str) -> BusResult<()>;

    /// Route `payload` to every queue bound to `exchange` with a pattern
    /// matching `routing_key`. Success only means the transport accepted it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> BusResult<()>;

    /// Declare `queue` if absent and bind it to `exchange` under `pattern`.
    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> BusResult<()>;

    /// Open a consuming handle on a declared queue. Several handles on the
    /// same queue compete for messages.
    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>>;
}

/// Consuming side of one queue with manual acknowledgment.
#[async_trait]
pub trait Subscription: Send {
    /// Wait up to the backend's poll interval for the next delivery.
    async fn next(&mut self) -> BusResult<Option<Delivery>>;

    /// Remove a processed delivery from the queue.
    async fn ack(&mut self, delivery: &Delivery) -> BusResult<()>;

    /// Put a delivery back on the queue with its redelivery count bumped.
    async fn requeue(&mut self, delivery: Delivery) -> BusResult<()>;

    /// Release backend resources held by this handle. Deliveries taken but
    /// not yet acknowledged become available to other handles.
    async fn close(&mut self) -> BusResult<()> {
        Ok(())
    }
}
