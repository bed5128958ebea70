//! Topic-routed event bus shared by the services.
//!
//! - [`EventBus`] / [`Subscription`]: durable exchanges and queues with
//!   manual acknowledgment (at-least-once delivery)
//! - [`InMemoryBus`] and [`RedisBus`] backends
//! - [`EventPublisher`]: best-effort typed publishing
//! - [`Consumer`]: worker loop dispatching a queue to an [`EventHandler`]

pub mod consumer;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod redis_backend;
pub mod topic;
pub mod topology;
pub mod transport;

use std::sync::Arc;

use common::{BusBackend, BusConfig};

pub use consumer::{Consumer, ConsumerOptions, ConsumerStats, EventHandler, HandlerError};
pub use error::{BusError, BusResult};
pub use memory::InMemoryBus;
pub use publisher::{EventPublisher, PublisherStats};
pub use redis_backend::{RedisBus, RedisBusOptions};
pub use topic::TopicPattern;
pub use transport::{Delivery, Envelope, EventBus, Subscription};

/// Build the configured backend. The Redis backend retries its initial
/// connection until it succeeds.
pub async fn connect(config: &BusConfig) -> BusResult<Arc<dyn EventBus>> {
    match config.backend {
        BusBackend::Memory => {
            tracing::info!("Using in-memory event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        BusBackend::Redis => {
            let bus = RedisBus::connect(&config.url, config.connect_retry()).await?;
            Ok(Arc::new(bus))
        }
    }
}
