//! Transport abstraction over the message broker.
//!
//! A [`Transport`] opens [`BrokerConnection`]s; a connection opens
//! [`BrokerChannel`]s, on which all queue operations happen. Channels are not
//! safe for concurrent use, so callers go through
//! [`ConnectionManager`](crate::ConnectionManager), which serializes access.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::topology::QueueTopology;

/// MIME type of every audit message body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Properties attached to a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    /// Body MIME type.
    pub content_type: String,

    /// Whether the broker should write the message to disk (delivery mode 2).
    pub persistent: bool,

    /// Publish time in unix seconds.
    pub timestamp: u64,
}

impl MessageProperties {
    /// Persistent JSON message stamped with `timestamp` (unix seconds).
    pub fn persistent_json(timestamp: u64) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
            timestamp,
        }
    }
}

/// A message handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to settle the delivery.
    pub delivery_tag: u64,

    /// Raw message body.
    pub body: Vec<u8>,

    /// True if the broker delivered this message before.
    pub redelivered: bool,
}

/// Stream of deliveries for one subscription. Ends when the channel closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Factory for broker connections.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Opens a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>>;

    /// Returns the transport name for identification.
    fn name(&self) -> &'static str;
}

/// An open transport connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + Debug {
    /// Returns true while the connection is usable.
    fn is_open(&self) -> bool;

    /// Opens a channel on this connection.
    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// A channel on which queue operations are performed.
#[async_trait]
pub trait BrokerChannel: Send + Sync + Debug {
    /// Returns true while the channel is usable.
    fn is_open(&self) -> bool;

    /// Limits unacknowledged deliveries held by consumers on this channel.
    async fn set_prefetch(&self, count: u16) -> Result<()>;

    /// Declares (idempotently) the queue described by `topology`.
    async fn declare_queue(&self, topology: &QueueTopology) -> Result<()>;

    /// Publishes `payload` to `queue` through the default exchange.
    async fn publish(&self, queue: &str, payload: &[u8], properties: &MessageProperties)
        -> Result<()>;

    /// Starts a manual-acknowledgment subscription on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Acknowledges a delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Rejects a delivery, optionally returning it to the queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()>;

    /// Closes the channel.
    async fn close(&self) -> Result<()>;
}
