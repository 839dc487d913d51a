//! In-process broker for tests and local development.
//!
//! Mirrors the RabbitMQ behavior the audit bus relies on:
//!
//! - durable queue declaration with TTL and max-length (`drop-head` overflow)
//! - per-channel prefetch limiting unacknowledged deliveries
//! - manual ack / nack with optional requeue (requeued messages go to the
//!   head of the queue and are flagged as redelivered)
//! - unacknowledged deliveries are requeued when their channel or connection
//!   closes
//! - publishes to an undeclared queue are silently dropped, as the default
//!   exchange does for unknown routing keys
//!
//! Failure injection hooks let tests simulate an unreachable broker, a link
//! that drops during queue declaration, and a broker that rejects or stalls
//! publishes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::redact_url;
use crate::error::{BrokerError, ConnectionError, Result};
use crate::topology::QueueTopology;
use crate::transport::{
    BrokerChannel, BrokerConnection, Delivery, DeliveryStream, MessageProperties, Transport,
};

/// A message as recorded at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Target queue.
    pub queue: String,
    /// Message body.
    pub body: Vec<u8>,
    /// Message properties.
    pub properties: MessageProperties,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: Vec<u8>,
    enqueued_at: Instant,
    redelivered: bool,
}

#[derive(Debug)]
struct MemoryQueue {
    topology: QueueTopology,
    ready: VecDeque<QueuedMessage>,
}

impl MemoryQueue {
    fn expire(&mut self, now: Instant) -> usize {
        let ttl = self.topology.message_ttl;
        let before = self.ready.len();
        self.ready.retain(|m| now.duration_since(m.enqueued_at) < ttl);
        before - self.ready.len()
    }
}

#[derive(Debug)]
struct ChannelState {
    connection_id: u64,
    prefetch: u16,
    next_tag: u64,
    unacked: HashMap<u64, (String, QueuedMessage)>,
}

impl ChannelState {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.unacked.len() < usize::from(self.prefetch)
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, MemoryQueue>,
    connections: HashSet<u64>,
    channels: HashMap<u64, ChannelState>,
    next_id: u64,
    connections_opened: usize,
    channels_opened: usize,
    published: Vec<PublishedMessage>,
    evicted: usize,
    expired: usize,
    unreachable: bool,
    failing_connects: u32,
    failing_declares: u32,
    publish_failure: Option<String>,
    publish_stall: Option<Duration>,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn requeue_unacked(&mut self, mut unacked: Vec<(u64, (String, QueuedMessage))>) {
        // Highest tag first so the oldest delivery ends up at the head.
        unacked.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, (queue, mut message)) in unacked {
            if let Some(q) = self.queues.get_mut(&queue) {
                message.redelivered = true;
                q.ready.push_front(message);
            }
        }
    }

    fn close_channel(&mut self, channel_id: u64) {
        if let Some(channel) = self.channels.remove(&channel_id) {
            self.requeue_unacked(channel.unacked.into_iter().collect());
        }
    }

    fn close_connection(&mut self, connection_id: u64) {
        self.connections.remove(&connection_id);
        let owned: Vec<u64> = self
            .channels
            .iter()
            .filter(|(_, c)| c.connection_id == connection_id)
            .map(|(id, _)| *id)
            .collect();
        for channel_id in owned {
            self.close_channel(channel_id);
        }
    }
}

enum Poll {
    Ready(Delivery),
    Pending,
    Closed,
}

#[derive(Debug, Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// Shared in-memory broker. Cloning yields another handle to the same broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a transport connecting to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
        }
    }

    fn wake(&self) {
        self.inner.notify.notify_waiters();
    }

    /// Makes every connection attempt fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.state.lock().unreachable = unreachable;
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.inner.state.lock().failing_connects = count;
    }

    /// Makes the next `count` queue declarations fail as if the link dropped
    /// mid-request.
    pub fn fail_next_declares(&self, count: u32) {
        self.inner.state.lock().failing_declares = count;
    }

    /// Makes every publish fail with `reason` (or succeed again with `None`).
    pub fn set_publish_failure(&self, reason: Option<&str>) {
        self.inner.state.lock().publish_failure = reason.map(str::to_string);
    }

    /// Makes every publish hang for `stall` and then fail, as a broker that
    /// stops answering would (or behave normally again with `None`).
    pub fn set_publish_stall(&self, stall: Option<Duration>) {
        self.inner.state.lock().publish_stall = stall;
    }

    /// Closes every open connection, as a broker restart would.
    pub fn drop_all_connections(&self) {
        {
            let mut state = self.inner.state.lock();
            let ids: Vec<u64> = state.connections.iter().copied().collect();
            for id in ids {
                state.close_connection(id);
            }
        }
        self.wake();
    }

    /// Enqueues a raw body on a declared queue, bypassing any channel.
    ///
    /// Returns false if the queue has not been declared.
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) -> bool {
        let enqueued = {
            let mut state = self.inner.state.lock();
            enqueue(&mut state, queue, body.into())
        };
        self.wake();
        enqueued
    }

    /// Total connections ever opened.
    pub fn connections_opened(&self) -> usize {
        self.inner.state.lock().connections_opened
    }

    /// Total channels ever opened.
    pub fn channels_opened(&self) -> usize {
        self.inner.state.lock().channels_opened
    }

    /// Currently open connections.
    pub fn open_connections(&self) -> usize {
        self.inner.state.lock().connections.len()
    }

    /// Every message accepted by a channel publish, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.state.lock().published.clone()
    }

    /// Ready (not yet delivered) messages on `queue`.
    pub fn queue_depth(&self, queue: &str) -> usize {
        let mut state = self.inner.state.lock();
        let now = Instant::now();
        let expired = state.queues.get_mut(queue).map_or(0, |q| q.expire(now));
        state.expired += expired;
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Ready message bodies on `queue`, head first.
    pub fn queue_bodies(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliveries currently awaiting ack across all channels.
    pub fn unacked_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .channels
            .values()
            .map(|c| c.unacked.len())
            .sum()
    }

    /// Topology `queue` was declared with, if any.
    pub fn declared(&self, queue: &str) -> Option<QueueTopology> {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.topology.clone())
    }

    /// Messages dropped by max-length overflow.
    pub fn evicted(&self) -> usize {
        self.inner.state.lock().evicted
    }

    /// Messages dropped by TTL expiry.
    pub fn expired(&self) -> usize {
        self.inner.state.lock().expired
    }

    /// Prefetch configured on every open channel.
    pub fn channel_prefetches(&self) -> Vec<u16> {
        self.inner
            .state
            .lock()
            .channels
            .values()
            .map(|c| c.prefetch)
            .collect()
    }

    fn poll_delivery(&self, channel_id: u64, queue: &str) -> Poll {
        let mut state = self.inner.state.lock();
        let now = Instant::now();

        match state.channels.get(&channel_id) {
            None => return Poll::Closed,
            Some(channel) if !channel.has_capacity() => return Poll::Pending,
            Some(_) => {}
        }

        let Some(q) = state.queues.get_mut(queue) else {
            return Poll::Pending;
        };
        let expired = q.expire(now);
        let next = q.ready.pop_front();
        state.expired += expired;

        let Some(message) = next else {
            return Poll::Pending;
        };
        let Some(channel) = state.channels.get_mut(&channel_id) else {
            return Poll::Closed;
        };
        channel.next_tag += 1;
        let delivery_tag = channel.next_tag;
        let delivery = Delivery {
            delivery_tag,
            body: message.body.clone(),
            redelivered: message.redelivered,
        };
        channel
            .unacked
            .insert(delivery_tag, (queue.to_string(), message));
        Poll::Ready(delivery)
    }
}

fn enqueue(state: &mut BrokerState, queue: &str, body: Vec<u8>) -> bool {
    let now = Instant::now();
    let Some(q) = state.queues.get_mut(queue) else {
        return false;
    };
    let expired = q.expire(now);
    q.ready.push_back(QueuedMessage {
        body,
        enqueued_at: now,
        redelivered: false,
    });
    let max = q.topology.max_length as usize;
    let mut evicted = 0;
    while q.ready.len() > max {
        q.ready.pop_front();
        evicted += 1;
    }
    state.expired += expired;
    state.evicted += evicted;
    true
}

/// Transport that connects to a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
}

impl MemoryTransport {
    /// Returns the broker this transport connects to.
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>> {
        // Let concurrent callers interleave, as a network handshake would.
        tokio::task::yield_now().await;

        let mut state = self.broker.inner.state.lock();
        if state.unreachable {
            return Err(ConnectionError::ConnectionRefused {
                endpoint: redact_url(url),
            }
            .into());
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ConnectionError::ConnectFailed {
                endpoint: redact_url(url),
                reason: "injected connect failure".to_string(),
            }
            .into());
        }

        let id = state.next_id();
        state.connections.insert(id);
        state.connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            broker: self.broker.clone(),
            id,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Connection to a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryConnection {
    broker: MemoryBroker,
    id: u64,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.broker.inner.state.lock().connections.contains(&self.id)
    }

    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let mut state = self.broker.inner.state.lock();
        if !state.connections.contains(&self.id) {
            return Err(BrokerError::Channel {
                reason: "connection is closed".to_string(),
            });
        }
        let id = state.next_id();
        state.channels.insert(
            id,
            ChannelState {
                connection_id: self.id,
                prefetch: 0,
                next_tag: 0,
                unacked: HashMap::new(),
            },
        );
        state.channels_opened += 1;
        Ok(Box::new(MemoryChannel {
            broker: self.broker.clone(),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.broker.inner.state.lock().close_connection(self.id);
        self.broker.wake();
        Ok(())
    }
}

/// Channel on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryChannel {
    broker: MemoryBroker,
    id: u64,
}

impl MemoryChannel {
    fn closed_error(&self) -> BrokerError {
        BrokerError::Channel {
            reason: format!("channel {} is closed", self.id),
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        self.broker.inner.state.lock().channels.contains_key(&self.id)
    }

    async fn set_prefetch(&self, count: u16) -> Result<()> {
        let mut state = self.broker.inner.state.lock();
        let channel = state
            .channels
            .get_mut(&self.id)
            .ok_or_else(|| self.closed_error())?;
        channel.prefetch = count;
        Ok(())
    }

    async fn declare_queue(&self, topology: &QueueTopology) -> Result<()> {
        let mut state = self.broker.inner.state.lock();
        if !state.channels.contains_key(&self.id) {
            return Err(self.closed_error());
        }
        if state.failing_declares > 0 {
            state.failing_declares -= 1;
            return Err(BrokerError::Channel {
                reason: format!(
                    "queue.declare on '{}' failed: connection reset by peer",
                    topology.name
                ),
            });
        }
        match state.queues.get(&topology.name) {
            Some(existing) if existing.topology != *topology => Err(BrokerError::QueueDeclare {
                queue: topology.name.clone(),
                reason: "PRECONDITION_FAILED - inequivalent arguments".to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                state.queues.insert(
                    topology.name.clone(),
                    MemoryQueue {
                        topology: topology.clone(),
                        ready: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<()> {
        let stall = self.broker.inner.state.lock().publish_stall;
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            return Err(BrokerError::Publish {
                queue: queue.to_string(),
                reason: format!("no response from broker after {}ms", stall.as_millis()),
            });
        }
        {
            let mut state = self.broker.inner.state.lock();
            if !state.channels.contains_key(&self.id) {
                return Err(self.closed_error());
            }
            if let Some(reason) = &state.publish_failure {
                return Err(BrokerError::Publish {
                    queue: queue.to_string(),
                    reason: reason.clone(),
                });
            }
            state.published.push(PublishedMessage {
                queue: queue.to_string(),
                body: payload.to_vec(),
                properties: properties.clone(),
            });
            enqueue(&mut state, queue, payload.to_vec());
        }
        self.broker.wake();
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        {
            let state = self.broker.inner.state.lock();
            if !state.channels.contains_key(&self.id) {
                return Err(self.closed_error());
            }
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::Subscribe {
                    queue: queue.to_string(),
                    reason: "NOT_FOUND - no queue".to_string(),
                });
            }
        }

        let broker = self.broker.clone();
        let channel_id = self.id;
        let queue = queue.to_string();

        let stream = futures::stream::unfold((), move |()| {
            let broker = broker.clone();
            let queue = queue.clone();
            async move {
                loop {
                    let notified = broker.inner.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    match broker.poll_delivery(channel_id, &queue) {
                        Poll::Ready(delivery) => return Some((Ok(delivery), ())),
                        Poll::Closed => return None,
                        Poll::Pending => notified.await,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        {
            let mut state = self.broker.inner.state.lock();
            let channel = state
                .channels
                .get_mut(&self.id)
                .ok_or_else(|| self.closed_error())?;
            channel
                .unacked
                .remove(&delivery_tag)
                .ok_or_else(|| BrokerError::Settle {
                    delivery_tag,
                    reason: "unknown delivery tag".to_string(),
                })?;
        }
        self.broker.wake();
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        {
            let mut state = self.broker.inner.state.lock();
            let channel = state
                .channels
                .get_mut(&self.id)
                .ok_or_else(|| self.closed_error())?;
            let entry = channel
                .unacked
                .remove(&delivery_tag)
                .ok_or_else(|| BrokerError::Settle {
                    delivery_tag,
                    reason: "unknown delivery tag".to_string(),
                })?;
            if requeue {
                state.requeue_unacked(vec![(delivery_tag, entry)]);
            }
        }
        self.broker.wake();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.broker.inner.state.lock().close_channel(self.id);
        self.broker.wake();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "memory://local";

    async fn open(broker: &MemoryBroker) -> (Box<dyn BrokerConnection>, Box<dyn BrokerChannel>) {
        let connection = broker.transport().connect(URL).await.unwrap();
        let channel = connection.create_channel().await.unwrap();
        channel.declare_queue(&QueueTopology::audit_events()).await.unwrap();
        (connection, channel)
    }

    fn props() -> MessageProperties {
        MessageProperties::persistent_json(0)
    }

    #[tokio::test]
    async fn test_publish_and_consume() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;

        channel.publish("audit_events", b"one", &props()).await.unwrap();
        let mut stream = channel.consume("audit_events", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();

        assert_eq!(delivery.body, b"one");
        assert!(!delivery.redelivered);
        assert_eq!(broker.unacked_count(), 1);

        channel.ack(delivery.delivery_tag).await.unwrap();
        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(broker.queue_depth("audit_events"), 0);
    }

    #[tokio::test]
    async fn test_prefetch_limits_in_flight() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;
        channel.set_prefetch(1).await.unwrap();

        for body in [b"a", b"b"] {
            channel.publish("audit_events", body, &props()).await.unwrap();
        }
        let mut stream = channel.consume("audit_events", "test").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(blocked.is_err(), "second delivery must wait for the ack");
        assert_eq!(broker.queue_depth("audit_events"), 1);

        channel.ack(first.delivery_tag).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.body, b"b");
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers_at_head() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;
        channel.set_prefetch(1).await.unwrap();

        channel.publish("audit_events", b"first", &props()).await.unwrap();
        channel.publish("audit_events", b"second", &props()).await.unwrap();
        let mut stream = channel.consume("audit_events", "test").await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        channel.nack(delivery.delivery_tag, true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.body, b"first");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_discards() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;

        channel.publish("audit_events", b"poison", &props()).await.unwrap();
        let mut stream = channel.consume("audit_events", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        channel.nack(delivery.delivery_tag, false).await.unwrap();

        assert_eq!(broker.queue_depth("audit_events"), 0);
        assert_eq!(broker.unacked_count(), 0);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let broker = MemoryBroker::new();
        let connection = broker.transport().connect(URL).await.unwrap();
        let channel = connection.create_channel().await.unwrap();
        let topology = QueueTopology::new("small", Duration::from_secs(60), 3);
        channel.declare_queue(&topology).await.unwrap();

        for i in 0..5u8 {
            channel.publish("small", &[i], &props()).await.unwrap();
        }

        assert_eq!(broker.queue_depth("small"), 3);
        assert_eq!(broker.evicted(), 2);
        assert_eq!(broker.queue_bodies("small"), vec![vec![2], vec![3], vec![4]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_messages() {
        let broker = MemoryBroker::new();
        let connection = broker.transport().connect(URL).await.unwrap();
        let channel = connection.create_channel().await.unwrap();
        let topology = QueueTopology::new("short", Duration::from_secs(10), 100);
        channel.declare_queue(&topology).await.unwrap();

        channel.publish("short", b"old", &props()).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        channel.publish("short", b"new", &props()).await.unwrap();

        assert_eq!(broker.queue_bodies("short"), vec![b"new".to_vec()]);
        assert_eq!(broker.expired(), 1);
    }

    #[tokio::test]
    async fn test_closing_channel_requeues_unacked() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;

        channel.publish("audit_events", b"in-flight", &props()).await.unwrap();
        let mut stream = channel.consume("audit_events", "test").await.unwrap();
        let _delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(broker.queue_depth("audit_events"), 0);

        channel.close().await.unwrap();
        assert_eq!(broker.queue_depth("audit_events"), 1);
        assert!(stream.next().await.is_none(), "stream ends when the channel closes");
    }

    #[tokio::test]
    async fn test_redeclare_with_different_arguments_fails() {
        let broker = MemoryBroker::new();
        let (_conn, channel) = open(&broker).await;
        let other = QueueTopology::new("audit_events", Duration::from_secs(1), 1);

        let err = channel.declare_queue(&other).await.unwrap_err();
        assert!(matches!(err, BrokerError::QueueDeclare { .. }));
    }

    #[tokio::test]
    async fn test_injected_declare_failure_is_retryable() {
        let broker = MemoryBroker::new();
        broker.fail_next_declares(1);
        let connection = broker.transport().connect(URL).await.unwrap();
        let channel = connection.create_channel().await.unwrap();
        let topology = QueueTopology::audit_events();

        let err = channel.declare_queue(&topology).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(broker.declared("audit_events").is_none());

        channel.declare_queue(&topology).await.unwrap();
        assert!(broker.declared("audit_events").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_broker_refuses() {
        let broker = MemoryBroker::new();
        broker.set_unreachable(true);

        let err = broker.transport().connect(URL).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Connection(ConnectionError::ConnectionRefused { .. })
        ));
        assert_eq!(broker.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_is_dropped() {
        let broker = MemoryBroker::new();
        let connection = broker.transport().connect(URL).await.unwrap();
        let channel = connection.create_channel().await.unwrap();

        channel.publish("nowhere", b"x", &props()).await.unwrap();
        assert_eq!(broker.queue_depth("nowhere"), 0);
        assert_eq!(broker.published().len(), 1);
    }
}
