//! Best-effort domain event publishing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::DomainEvent;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::transport::EventBus;

/// Publish counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

impl PublisherStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events lost to transport failure or timeout.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Publishes [`DomainEvent`]s after the owning store write has committed.
///
/// Publishing never fails the caller: a bus outage drops the event with a
/// `consistency` warning and bumps [`PublisherStats::dropped`].
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    timeout: Duration,
    stats: Arc<PublisherStats>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            stats: Arc::new(PublisherStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PublisherStats> {
        self.stats.clone()
    }

    /// Returns whether the transport accepted the event.
    pub async fn publish(&self, event: &DomainEvent) -> bool {
        let exchange = event.exchange();
        let routing_key = event.routing_key();

        let sent = tokio::time::timeout(
            self.timeout,
            self.bus.publish(exchange, routing_key, event.payload()),
        )
        .await
        .unwrap_or(Err(BusError::Timeout));

        match sent {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(exchange, routing_key, user_id = %event.user_id(), "Domain event published");
                true
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "consistency",
                    exchange,
                    routing_key,
                    user_id = %event.user_id(),
                    error = %e,
                    dropped_total = self.stats.dropped(),
                    "Domain event dropped"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;
    use crate::topology;
    use domain::events::USER_SERVICE_QUEUE;

    async fn setup() -> (InMemoryBus, EventPublisher) {
        let bus = InMemoryBus::new();
        topology::declare_exchanges(&bus).await.unwrap();
        topology::bind_user_service_queues(&bus).await.unwrap();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), Duration::from_millis(200));
        (bus, publisher)
    }

    #[tokio::test]
    async fn test_publish_counts_success() {
        let (bus, publisher) = setup().await;
        assert!(publisher.publish(&DomainEvent::user_registered("u1", "a@x.com", "A")).await);
        assert_eq!(publisher.stats().published(), 1);
        assert_eq!(bus.queue_depth(USER_SERVICE_QUEUE).await, (1, 0));
    }

    #[tokio::test]
    async fn test_outage_drops_without_error() {
        let (bus, publisher) = setup().await;
        bus.set_available(false);

        assert!(!publisher.publish(&DomainEvent::todo_created("t1", "u1")).await);
        assert_eq!(publisher.stats().dropped(), 1);
        assert_eq!(publisher.stats().published(), 0);
    }
}
