//! Queue consumer loop.
//!
//! Each worker owns one subscription and runs
//! `next -> handler (bounded) -> ack | requeue` until shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::BusConfig;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::BusResult;
use crate::transport::{Delivery, EventBus, Subscription};

/// Outcome of a failed handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The message can never succeed. It is acked and dropped.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A transient failure. The message is put back on the queue.
    #[error("retryable failure: {0}")]
    Retryable(String),
}

/// Processes one message payload.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, routing_key: &str, payload: &serde_json::Value)
        -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub workers: usize,
    pub handler_timeout: Duration,
    pub requeue_delay: Duration,
    /// Pause after a transport error before polling again
    pub error_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            handler_timeout: Duration::from_secs(10),
            requeue_delay: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&BusConfig> for ConsumerOptions {
    fn from(config: &BusConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            handler_timeout: config.handler_timeout(),
            requeue_delay: config.requeue_delay(),
            error_backoff: config.connect_retry(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    malformed: AtomicU64,
    requeued: AtomicU64,
    transport_errors: AtomicU64,
}

impl ConsumerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }
}

/// Dispatches one queue's messages to an [`EventHandler`].
pub struct Consumer {
    bus: Arc<dyn EventBus>,
    queue: String,
    handler: Arc<dyn EventHandler>,
    options: ConsumerOptions,
    stats: Arc<ConsumerStats>,
}

impl Consumer {
    pub fn new(
        bus: Arc<dyn EventBus>,
        queue: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            bus,
            queue: queue.into(),
            handler,
            options,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Start one worker per configured slot and process until `shutdown`
    /// flips to `true` (or its sender is dropped). A worker that cannot
    /// subscribe keeps retrying after `error_backoff`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> BusResult<()> {
        let mut workers = JoinSet::new();
        for index in 0..self.options.workers.max(1) {
            let worker = Worker {
                index,
                queue: self.queue.clone(),
                bus: self.bus.clone(),
                handler: self.handler.clone(),
                options: self.options.clone(),
                stats: self.stats.clone(),
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run());
        }

        info!(queue = %self.queue, workers = workers.len(), "Consumer started");
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(queue = %self.queue, error = %e, "Consumer worker aborted");
            }
        }
        info!(queue = %self.queue, "Consumer stopped");
        Ok(())
    }
}

struct Worker {
    index: usize,
    queue: String,
    bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    options: ConsumerOptions,
    stats: Arc<ConsumerStats>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        if let Some(subscription) = self.subscribe().await {
            self.consume(subscription).await;
        }
        debug!(queue = %self.queue, worker = self.index, "Worker exiting");
    }

    /// `None` when shutdown arrives before a subscription is open.
    async fn subscribe(&mut self) -> Option<Box<dyn Subscription>> {
        loop {
            if *self.shutdown.borrow() {
                return None;
            }
            match self.bus.subscribe(&self.queue).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => {
                    self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(queue = %self.queue, worker = self.index, error = %e, "Subscribe failed");
                    if self.pause(self.options.error_backoff).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn consume(&mut self, mut subscription: Box<dyn Subscription>) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = subscription.next() => next,
            };

            match next {
                Ok(Some(delivery)) => self.dispatch(subscription.as_mut(), delivery).await,
                Ok(None) => {}
                Err(e) => {
                    self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(queue = %self.queue, worker = self.index, error = %e, "Receive failed");
                    if self.pause(self.options.error_backoff).await {
                        break;
                    }
                }
            }
        }

        if let Err(e) = subscription.close().await {
            warn!(queue = %self.queue, worker = self.index, error = %e, "Closing subscription failed");
        }
    }

    /// Sleep unless shutdown arrives first. Returns whether to stop.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = self.shutdown.changed() => changed.is_err() || *self.shutdown.borrow(),
        }
    }

    async fn dispatch(&mut self, subscription: &mut dyn Subscription, delivery: Delivery) {
        let routing_key = delivery.envelope.routing_key.clone();
        let outcome = tokio::time::timeout(
            self.options.handler_timeout,
            self.handler.handle(&routing_key, &delivery.envelope.payload),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.ack(subscription, &delivery).await;
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(HandlerError::Malformed(reason))) => {
                error!(
                    queue = %self.queue,
                    routing_key = %routing_key,
                    %reason,
                    "Dropping malformed message"
                );
                self.ack(subscription, &delivery).await;
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(HandlerError::Retryable(reason))) => {
                self.retry(subscription, delivery, &reason).await;
            }
            Err(_) => {
                self.retry(subscription, delivery, "handler timed out").await;
            }
        }
    }

    async fn ack(&mut self, subscription: &mut dyn Subscription, delivery: &Delivery) {
        if let Err(e) = subscription.ack(delivery).await {
            // Left unacked; the transport will deliver it again.
            self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %self.queue, tag = %delivery.tag, error = %e, "Ack failed");
        }
    }

    async fn retry(
        &mut self,
        subscription: &mut dyn Subscription,
        delivery: Delivery,
        reason: &str,
    ) {
        self.stats.requeued.fetch_add(1, Ordering::Relaxed);
        warn!(
            queue = %self.queue,
            routing_key = %delivery.envelope.routing_key,
            redelivered = delivery.envelope.redelivered,
            %reason,
            "Handler failed, requeueing"
        );

        tokio::time::sleep(self.options.requeue_delay).await;
        let tag = delivery.tag.clone();
        if let Err(e) = subscription.requeue(delivery).await {
            self.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %self.queue, tag = %tag, error = %e, "Requeue failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        calls: AtomicUsize,
        fail_first: usize,
        malformed: bool,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(
            &self,
            _routing_key: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.malformed {
                return Err(HandlerError::Malformed("bad".into()));
            }
            if call < self.fail_first {
                return Err(HandlerError::Retryable("flaky".into()));
            }
            Ok(())
        }
    }

    fn fast_options() -> ConsumerOptions {
        ConsumerOptions {
            workers: 2,
            handler_timeout: Duration::from_millis(200),
            requeue_delay: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
        }
    }

    async fn bus() -> InMemoryBus {
        let bus = InMemoryBus::with_poll_interval(Duration::from_millis(10));
        bus.declare_exchange("x").await.unwrap();
        bus.bind("q", "x", "#").await.unwrap();
        bus
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_retryable_failure_is_redelivered() {
        let bus = bus().await;
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: 2,
            malformed: false,
        });
        let consumer = Consumer::new(Arc::new(bus.clone()), "q", handler.clone(), fast_options());
        let stats = consumer.stats();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(rx));

        bus.publish("x", "a.b", json!({})).await.unwrap();
        wait_until(|| stats.processed() == 1).await;

        assert_eq!(stats.processed(), 1);
        assert_eq!(stats.requeued(), 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(bus.queue_depth("q").await, (0, 0));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_malformed_message_is_acked() {
        let bus = bus().await;
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            malformed: true,
        });
        let consumer = Consumer::new(Arc::new(bus.clone()), "q", handler.clone(), fast_options());
        let stats = consumer.stats();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(rx));

        bus.publish("x", "a.b", json!({})).await.unwrap();
        wait_until(|| stats.malformed() == 1).await;

        assert_eq!(stats.malformed(), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.queue_depth("q").await, (0, 0));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_retried_until_bus_returns() {
        let bus = bus().await;
        bus.set_available(false);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            malformed: false,
        });
        let consumer = Consumer::new(Arc::new(bus.clone()), "q", handler.clone(), fast_options());
        let stats = consumer.stats();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(rx));

        wait_until(|| stats.transport_errors() > 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        bus.set_available(true);
        bus.publish("x", "a.b", json!({})).await.unwrap();
        wait_until(|| stats.processed() == 1).await;
        assert_eq!(stats.processed(), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_workers() {
        let bus = bus().await;
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            malformed: false,
        });
        let consumer = Consumer::new(Arc::new(bus), "q", handler, fast_options());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(rx));

        drop(tx);
        let finished = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(finished.is_ok());
    }
}
