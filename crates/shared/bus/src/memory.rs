//! In-process event bus.
//!
//! Same routing and acknowledgment semantics as the Redis backend, without
//! durability across restarts. Used by tests and single-process deployments.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::{BusError, BusResult};
use crate::topic::TopicPattern;
use crate::transport::{Delivery, Envelope, EventBus, Subscription};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    unacked: HashMap<String, Delivery>,
}

struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Queue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    async fn push(&self, delivery: Delivery) {
        self.state.lock().await.ready.push_back(delivery);
        self.notify.notify_one();
    }
}

struct Binding {
    exchange: String,
    pattern: TopicPattern,
    queue: String,
}

#[derive(Default)]
struct Topology {
    exchanges: HashSet<String>,
    bindings: Vec<Binding>,
    queues: HashMap<String, Arc<Queue>>,
}

struct Inner {
    topology: Mutex<Topology>,
    available: AtomicBool,
    next_tag: AtomicU64,
    poll_interval: Duration,
}

/// Process-local topic bus. Cloning shares the same exchanges and queues.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                topology: Mutex::new(Topology::default()),
                available: AtomicBool::new(true),
                next_tag: AtomicU64::new(1),
                poll_interval,
            }),
        }
    }

    /// Simulate a broker outage. While unavailable every operation fails
    /// with [`BusError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// `(ready, unacked)` message counts for a queue.
    pub async fn queue_depth(&self, queue: &str) -> (usize, usize) {
        let queue = self.inner.topology.lock().await.queues.get(queue).cloned();
        match queue {
            Some(q) => {
                let state = q.state.lock().await;
                (state.ready.len(), state.unacked.len())
            }
            None => (0, 0),
        }
    }

    fn ensure_available(&self) -> BusResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Unavailable("in-memory bus switched off".to_string()))
        }
    }

    fn next_tag(&self) -> String {
        self.inner.next_tag.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn declare_exchange(&self, exchange: &str) -> BusResult<()> {
        self.ensure_available()?;
        self.inner
            .topology
            .lock()
            .await
            .exchanges
            .insert(exchange.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> BusResult<()> {
        self.ensure_available()?;

        let targets: Vec<Arc<Queue>> = {
            let topology = self.inner.topology.lock().await;
            if !topology.exchanges.contains(exchange) {
                return Err(BusError::UnknownExchange(exchange.to_string()));
            }

            let mut seen = HashSet::new();
            topology
                .bindings
                .iter()
                .filter(|b| b.exchange == exchange && b.pattern.matches(routing_key))
                .filter(|b| seen.insert(b.queue.as_str()))
                .filter_map(|b| topology.queues.get(&b.queue).cloned())
                .collect()
        };

        if targets.is_empty() {
            debug!(exchange, routing_key, "No queue bound for routing key, message dropped");
            return Ok(());
        }

        let envelope = Envelope::new(exchange, routing_key, payload);
        for queue in targets {
            queue
                .push(Delivery {
                    tag: self.next_tag(),
                    envelope: envelope.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> BusResult<()> {
        self.ensure_available()?;
        let parsed = TopicPattern::parse(pattern)?;

        let mut topology = self.inner.topology.lock().await;
        if !topology.exchanges.contains(exchange) {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }

        topology
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Queue::new()));

        let exists = topology
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.exchange == exchange && b.pattern == parsed);
        if !exists {
            topology.bindings.push(Binding {
                exchange: exchange.to_string(),
                pattern: parsed,
                queue: queue.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>> {
        self.ensure_available()?;
        let handle = self
            .inner
            .topology
            .lock()
            .await
            .queues
            .get(queue)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;

        Ok(Box::new(InMemorySubscription {
            bus: self.clone(),
            queue: handle,
            held: HashSet::new(),
        }))
    }
}

struct InMemorySubscription {
    bus: InMemoryBus,
    queue: Arc<Queue>,
    /// Tags taken by this handle and not yet settled
    held: HashSet<String>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> BusResult<Option<Delivery>> {
        loop {
            self.bus.ensure_available()?;
            {
                let mut state = self.queue.state.lock().await;
                if let Some(delivery) = state.ready.pop_front() {
                    state.unacked.insert(delivery.tag.clone(), delivery.clone());
                    self.held.insert(delivery.tag.clone());
                    return Ok(Some(delivery));
                }
            }

            let wait = tokio::time::timeout(self.bus.inner.poll_interval, self.queue.notify.notified());
            if wait.await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> BusResult<()> {
        self.bus.ensure_available()?;
        self.queue.state.lock().await.unacked.remove(&delivery.tag);
        self.held.remove(&delivery.tag);
        Ok(())
    }

    async fn requeue(&mut self, delivery: Delivery) -> BusResult<()> {
        self.bus.ensure_available()?;
        self.held.remove(&delivery.tag);
        let mut retry = {
            let mut state = self.queue.state.lock().await;
            state.unacked.remove(&delivery.tag).unwrap_or(delivery)
        };
        retry.envelope.redelivered += 1;
        retry.tag = self.bus.next_tag();
        self.queue.push(retry).await;
        Ok(())
    }

    async fn close(&mut self) -> BusResult<()> {
        let mut state = self.queue.state.lock().await;
        let mut released = 0;
        for tag in self.held.drain() {
            if let Some(delivery) = state.unacked.remove(&tag) {
                state.ready.push_front(delivery);
                released += 1;
            }
        }
        drop(state);

        if released > 0 {
            debug!(released, "Released unacknowledged deliveries");
            self.queue.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    async fn bus_with_queue() -> InMemoryBus {
        let bus = InMemoryBus::with_poll_interval(Duration::from_millis(20));
        bus.declare_exchange("todo_events").await.unwrap();
        bus.bind("q", "todo_events", "todo.*").await.unwrap();
        bus
    }

    #[tokio::test]
    async fn test_publish_routes_to_bound_queue() {
        let bus = bus_with_queue().await;
        bus.publish("todo_events", "todo.created", json!({"n": 1}))
            .await
            .unwrap();

        let mut sub = bus.subscribe("q").await.unwrap();
        let delivery = sub.next().await.unwrap().unwrap();
        assert_eq!(delivery.envelope.routing_key, "todo.created");
        assert_eq!(delivery.envelope.payload["n"], 1);
        assert_eq!(bus.queue_depth("q").await, (0, 1));

        sub.ack(&delivery).await.unwrap();
        assert_eq!(bus.queue_depth("q").await, (0, 0));
    }

    #[tokio::test]
    async fn test_unmatched_routing_key_is_dropped() {
        let bus = bus_with_queue().await;
        bus.publish("todo_events", "user.registered", json!({}))
            .await
            .unwrap();
        assert_eq!(bus.queue_depth("q").await, (0, 0));
    }

    #[tokio::test]
    async fn test_undeclared_exchange_is_error() {
        let bus = InMemoryBus::new();
        let err = bus.publish("nope", "a.b", json!({})).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownExchange(_)));
    }

    #[tokio::test]
    async fn test_overlapping_bindings_deliver_once() {
        let bus = bus_with_queue().await;
        bus.bind("q", "todo_events", "#").await.unwrap();
        bus.publish("todo_events", "todo.deleted", json!({}))
            .await
            .unwrap();
        assert_eq!(bus.queue_depth("q").await, (1, 0));
    }

    #[tokio::test]
    async fn test_requeue_bumps_redelivery_count() {
        let bus = bus_with_queue().await;
        bus.publish("todo_events", "todo.created", json!({}))
            .await
            .unwrap();

        let mut sub = bus.subscribe("q").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        sub.requeue(first).await.unwrap();

        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.envelope.redelivered, 1);
        assert_eq!(bus.queue_depth("q").await, (0, 1));
    }

    #[tokio::test]
    async fn test_next_times_out_when_empty() {
        let bus = bus_with_queue().await;
        let mut sub = bus.subscribe("q").await.unwrap();
        assert!(sub.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let bus = bus_with_queue().await;
        bus.set_available(false);
        let err = assert_err!(bus.publish("todo_events", "todo.created", json!({})).await);
        assert!(matches!(err, BusError::Unavailable(_)));

        bus.set_available(true);
        assert_ok!(bus.publish("todo_events", "todo.created", json!({})).await);
    }

    #[tokio::test]
    async fn test_close_releases_unacked_deliveries() {
        let bus = bus_with_queue().await;
        bus.publish("todo_events", "todo.created", json!({"n": 1})).await.unwrap();
        bus.publish("todo_events", "todo.created", json!({"n": 2})).await.unwrap();

        let mut first = bus.subscribe("q").await.unwrap();
        let settled = first.next().await.unwrap().unwrap();
        first.ack(&settled).await.unwrap();
        let held = first.next().await.unwrap().unwrap();
        assert_eq!(bus.queue_depth("q").await, (0, 1));

        first.close().await.unwrap();
        assert_eq!(bus.queue_depth("q").await, (1, 0));

        let mut second = bus.subscribe("q").await.unwrap();
        let again = second.next().await.unwrap().unwrap();
        assert_eq!(again.tag, held.tag);
        assert_eq!(again.envelope.payload["n"], 2);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_queue() {
        let bus = InMemoryBus::new();
        assert!(matches!(
            bus.subscribe("missing").await,
            Err(BusError::UnknownQueue(_))
        ));
    }
}
