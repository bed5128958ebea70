//! Redis Streams backend.
//!
//! Layout:
//! - `bus:exchanges` set of declared exchanges
//! - `bus:queues` set of declared queues
//! - `bus:bindings:{exchange}` set of `queue|pattern` members
//! - `bus:queue:{queue}` stream per queue, consumer group named after the queue
//!
//! Stream entries are durable; an entry stays pending until XACK, so a
//! consumer that dies mid-handler leaves it for [`RedisSubscription`] to
//! reclaim once it has been idle long enough. Consumers are named per
//! subscription and removed from the group once they hold no pending
//! entries, either on close or when found idle by another subscription.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamInfoConsumersReply, StreamPendingCountReply,
    StreamReadReply,
};
use tracing::{debug, error, info, warn};

use crate::error::{BusError, BusResult};
use crate::topic::TopicPattern;
use crate::transport::{Delivery, Envelope, EventBus, Subscription};

const KEY_PREFIX: &str = "bus";
const ENVELOPE_FIELD: &str = "envelope";
const RECLAIM_BATCH: usize = 16;

/// Tuning knobs for the Redis backend.
#[derive(Debug, Clone)]
pub struct RedisBusOptions {
    /// How long one XREADGROUP blocks waiting for entries
    pub block: Duration,
    /// Pending entries idle at least this long are reclaimed
    pub claim_idle: Duration,
    /// How often a subscription checks for stale pending entries
    pub claim_interval: Duration,
}

impl Default for RedisBusOptions {
    fn default() -> Self {
        Self {
            block: Duration::from_millis(1000),
            claim_idle: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
        }
    }
}

fn exchanges_key() -> String {
    format!("{}:exchanges", KEY_PREFIX)
}

fn queues_key() -> String {
    format!("{}:queues", KEY_PREFIX)
}

fn bindings_key(exchange: &str) -> String {
    format!("{}:bindings:{}", KEY_PREFIX, exchange)
}

fn stream_key(queue: &str) -> String {
    format!("{}:queue:{}", KEY_PREFIX, queue)
}

fn binding_member(queue: &str, pattern: &str) -> String {
    format!("{}|{}", queue, pattern)
}

/// Exclusive XPENDING range start following `id`.
fn after(id: &str) -> String {
    format!("({}", id)
}

/// Names of consumers other than `own` with nothing pending and no
/// activity for at least `idle_ms`.
fn abandoned_consumers(reply: StreamInfoConsumersReply, own: &str, idle_ms: usize) -> Vec<String> {
    reply
        .consumers
        .into_iter()
        .filter(|c| c.name != own && c.pending == 0 && c.idle >= idle_ms)
        .map(|c| c.name)
        .collect()
}

/// Topic bus over Redis Streams.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
    options: RedisBusOptions,
}

impl RedisBus {
    /// Connect, retrying with a fixed delay until Redis answers.
    /// A malformed URL fails immediately.
    pub async fn connect(url: &str, retry_delay: Duration) -> BusResult<Self> {
        Self::connect_with_options(url, retry_delay, RedisBusOptions::default()).await
    }

    pub async fn connect_with_options(
        url: &str,
        retry_delay: Duration,
        options: RedisBusOptions,
    ) -> BusResult<Self> {
        let client = redis::Client::open(url)?;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match client.get_connection_manager().await {
                Ok(conn) => {
                    info!(attempt, "Connected to event bus");
                    return Ok(Self {
                        client,
                        conn,
                        options,
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = retry_delay.as_millis() as u64,
                        "Event bus connection failed, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    async fn require_member(&self, set: String, member: &str) -> BusResult<bool> {
        let mut conn = self.conn.clone();
        let found: bool = redis::cmd("SISMEMBER")
            .arg(set)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn declare_exchange(&self, exchange: &str) -> BusResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SADD")
            .arg(exchanges_key())
            .arg(exchange)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> BusResult<()> {
        if !self.require_member(exchanges_key(), exchange).await? {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }

        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(bindings_key(exchange))
            .query_async(&mut conn)
            .await?;

        let mut queues: Vec<&str> = members
            .iter()
            .filter_map(|m| m.split_once('|'))
            .filter(|(_, pattern)| {
                TopicPattern::parse(pattern)
                    .map(|p| p.matches(routing_key))
                    .unwrap_or(false)
            })
            .map(|(queue, _)| queue)
            .collect();
        queues.sort_unstable();
        queues.dedup();

        if queues.is_empty() {
            debug!(exchange, routing_key, "No queue bound for routing key, message dropped");
            return Ok(());
        }

        let envelope = serde_json::to_string(&Envelope::new(exchange, routing_key, payload))?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for queue in &queues {
            pipe.cmd("XADD")
                .arg(stream_key(queue))
                .arg("*")
                .arg(ENVELOPE_FIELD)
                .arg(&envelope)
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(exchange, routing_key, queues = queues.len(), "Event published");
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> BusResult<()> {
        TopicPattern::parse(pattern)?;
        if !self.require_member(exchanges_key(), exchange).await? {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }

        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key(queue))
            .arg(queue)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => info!(queue, "Declared queue"),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }

        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(queues_key())
            .arg(queue)
            .ignore()
            .cmd("SADD")
            .arg(bindings_key(exchange))
            .arg(binding_member(queue, pattern))
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(queue, exchange, pattern, "Queue bound");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>> {
        if !self.require_member(queues_key(), queue).await? {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }

        // Blocking reads get a connection of their own.
        let conn = self.client.get_connection_manager().await?;
        let consumer = format!("{}-{}", queue, uuid::Uuid::new_v4().simple());
        debug!(queue, consumer = %consumer, "Subscription opened");

        Ok(Box::new(RedisSubscription {
            conn,
            stream: stream_key(queue),
            group: queue.to_string(),
            consumer,
            options: self.options.clone(),
            buffered: VecDeque::new(),
            last_reclaim: None,
        }))
    }
}

/// One consumer within a queue's consumer group.
pub struct RedisSubscription {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    options: RedisBusOptions,
    buffered: VecDeque<Delivery>,
    last_reclaim: Option<Instant>,
}

impl RedisSubscription {
    /// Decode stream entries; undecodable ones are removed from the stream.
    async fn decode_entries(&mut self, entries: Vec<StreamId>) -> BusResult<()> {
        for entry in entries {
            let decoded = entry
                .get::<String>(ENVELOPE_FIELD)
                .ok_or_else(|| "missing envelope field".to_string())
                .and_then(|raw| {
                    serde_json::from_str::<Envelope>(&raw).map_err(|e| e.to_string())
                });

            match decoded {
                Ok(envelope) => self.buffered.push_back(Delivery {
                    tag: entry.id,
                    envelope,
                }),
                Err(reason) => {
                    error!(stream = %self.stream, id = %entry.id, %reason, "Discarding undecodable stream entry");
                    self.remove(&entry.id).await?;
                }
            }
        }
        Ok(())
    }

    async fn remove(&mut self, id: &str) -> BusResult<()> {
        let _: () = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(id)
            .ignore()
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    fn reclaim_due(&self) -> bool {
        self.last_reclaim
            .map_or(true, |at| at.elapsed() >= self.options.claim_interval)
    }

    /// Ids of up to `RECLAIM_BATCH` entries other consumers have left
    /// idle for at least `idle_ms`, scanning the whole pending list.
    async fn stale_pending(&mut self, idle_ms: usize) -> BusResult<Vec<String>> {
        let mut stale = Vec::new();
        let mut start = "-".to_string();

        while stale.len() < RECLAIM_BATCH {
            let page: StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(&self.stream)
                .arg(&self.group)
                .arg("IDLE")
                .arg(idle_ms)
                .arg(&start)
                .arg("+")
                .arg(RECLAIM_BATCH)
                .query_async(&mut self.conn)
                .await?;

            let exhausted = page.ids.len() < RECLAIM_BATCH;
            if let Some(last) = page.ids.last() {
                start = after(&last.id);
            }
            stale.extend(
                page.ids
                    .into_iter()
                    .filter(|p| p.consumer != self.consumer)
                    .map(|p| p.id),
            );
            if exhausted {
                break;
            }
        }

        stale.truncate(RECLAIM_BATCH);
        Ok(stale)
    }

    /// Remove group consumers left behind by subscriptions that went away
    /// without closing.
    async fn remove_abandoned(&mut self, idle_ms: usize) -> BusResult<()> {
        let info: StreamInfoConsumersReply = redis::cmd("XINFO")
            .arg("CONSUMERS")
            .arg(&self.stream)
            .arg(&self.group)
            .query_async(&mut self.conn)
            .await?;

        for name in abandoned_consumers(info, &self.consumer, idle_ms) {
            self.delete_consumer(&name).await?;
            debug!(stream = %self.stream, consumer = %name, "Removed abandoned consumer");
        }
        Ok(())
    }

    async fn delete_consumer(&mut self, name: &str) -> BusResult<()> {
        let _: i64 = redis::cmd("XGROUP")
            .arg("DELCONSUMER")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(name)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Claim entries another consumer left pending for too long.
    async fn reclaim_stale(&mut self) -> BusResult<()> {
        self.last_reclaim = Some(Instant::now());
        let idle_ms = self.options.claim_idle.as_millis() as usize;

        let stale = self.stale_pending(idle_ms).await?;
        if stale.is_empty() {
            return self.remove_abandoned(idle_ms).await;
        }
        if stale.len() == RECLAIM_BATCH {
            // More may be waiting; check again once this batch is handled.
            self.last_reclaim = None;
        }

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(idle_ms)
            .arg(&stale)
            .query_async(&mut self.conn)
            .await?;

        if !claimed.ids.is_empty() {
            warn!(
                stream = %self.stream,
                count = claimed.ids.len(),
                "Reclaimed stale pending entries"
            );
        }
        self.decode_entries(claimed.ids).await
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next(&mut self) -> BusResult<Option<Delivery>> {
        if let Some(delivery) = self.buffered.pop_front() {
            return Ok(Some(delivery));
        }

        if self.reclaim_due() {
            self.reclaim_stale().await?;
            if let Some(delivery) = self.buffered.pop_front() {
                return Ok(Some(delivery));
            }
        }

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.options.block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut self.conn)
            .await?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        self.decode_entries(entries).await?;

        Ok(self.buffered.pop_front())
    }

    async fn ack(&mut self, delivery: &Delivery) -> BusResult<()> {
        self.remove(&delivery.tag).await
    }

    async fn requeue(&mut self, delivery: Delivery) -> BusResult<()> {
        let mut envelope = delivery.envelope;
        envelope.redelivered += 1;
        let raw = serde_json::to_string(&envelope)?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg(ENVELOPE_FIELD)
            .arg(raw)
            .ignore()
            .cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&delivery.tag)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(&delivery.tag)
            .ignore()
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> BusResult<()> {
        // Buffered deliveries stay pending under this consumer for
        // reclamation; deleting it would drop them from the pending list.
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(1)
            .arg(&self.consumer)
            .query_async(&mut self.conn)
            .await?;
        if !pending.ids.is_empty() {
            debug!(stream = %self.stream, consumer = %self.consumer, "Leaving consumer with pending entries");
            return Ok(());
        }

        let consumer = self.consumer.clone();
        self.delete_consumer(&consumer).await?;
        debug!(stream = %self.stream, consumer = %consumer, "Subscription closed");
        Ok(())
    }
}
