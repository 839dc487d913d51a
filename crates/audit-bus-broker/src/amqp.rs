//! AMQP 0-9-1 transport backed by `lapin`.

use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::protocol::AMQPErrorKind;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::config::redact_url;
use crate::error::{BrokerError, ConnectionError, Result};
use crate::topology::QueueTopology;
use crate::transport::{
    BrokerChannel, BrokerConnection, Delivery, DeliveryStream, MessageProperties, Transport,
};

const REPLY_SUCCESS: u16 = 200;

/// Transport that connects to a RabbitMQ-compatible broker.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmqpTransport;

impl AmqpTransport {
    /// Creates a new AMQP transport.
    pub const fn new() -> Self {
        Self
    }
}

fn connect_error(url: &str, err: &lapin::Error) -> BrokerError {
    let endpoint = redact_url(url);
    if let lapin::Error::IOError(io) = err {
        if io.kind() == std::io::ErrorKind::ConnectionRefused {
            return ConnectionError::ConnectionRefused { endpoint }.into();
        }
    }
    ConnectionError::ConnectFailed {
        endpoint,
        reason: err.to_string(),
    }
    .into()
}

/// True when the broker closed the channel in answer to the request itself
/// (a soft error such as `PRECONDITION_FAILED` or `NOT_FOUND`), not because the
/// link underneath failed.
fn rejected_by_broker(err: &lapin::Error) -> bool {
    matches!(err, lapin::Error::ProtocolError(amqp) if matches!(amqp.kind(), AMQPErrorKind::Soft(_)))
}

fn declare_error(queue: &str, err: &lapin::Error) -> BrokerError {
    if rejected_by_broker(err) {
        return BrokerError::QueueDeclare {
            queue: queue.to_string(),
            reason: err.to_string(),
        };
    }
    BrokerError::Channel {
        reason: format!("queue.declare on '{queue}' failed: {err}"),
    }
}

fn subscribe_error(queue: &str, err: &lapin::Error) -> BrokerError {
    if rejected_by_broker(err) {
        return BrokerError::Subscribe {
            queue: queue.to_string(),
            reason: err.to_string(),
        };
    }
    BrokerError::Channel {
        reason: format!("basic.consume on '{queue}' failed: {err}"),
    }
}

fn queue_arguments(topology: &QueueTopology) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongInt(topology.ttl_millis()),
    );
    arguments.insert(
        ShortString::from("x-max-length"),
        AMQPValue::LongInt(topology.max_length_arg()),
    );
    arguments
}

fn basic_properties(properties: &MessageProperties) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(properties.content_type.as_str()))
        .with_delivery_mode(if properties.persistent { 2 } else { 1 })
        .with_timestamp(properties.timestamp)
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| connect_error(url, &e))?;
        Ok(Box::new(AmqpConnection { connection }))
    }

    fn name(&self) -> &'static str {
        "amqp"
    }
}

/// An open AMQP connection.
pub struct AmqpConnection {
    connection: Connection,
}

impl fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("connected", &self.connection.status().connected())
            .finish()
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel {
                reason: e.to_string(),
            })?;
        Ok(Box::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> Result<()> {
        self.connection
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| BrokerError::Channel {
                reason: format!("connection close failed: {e}"),
            })
    }
}

/// An open AMQP channel.
pub struct AmqpChannel {
    channel: Channel,
}

impl fmt::Debug for AmqpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpChannel")
            .field("id", &self.channel.id())
            .field("connected", &self.channel.status().connected())
            .finish()
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn set_prefetch(&self, count: u16) -> Result<()> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Channel {
                reason: format!("basic.qos failed: {e}"),
            })
    }

    async fn declare_queue(&self, topology: &QueueTopology) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: topology.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&topology.name, options, queue_arguments(topology))
            .await
            .map(|_| ())
            .map_err(|e| declare_error(&topology.name, &e))
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<()> {
        // Publisher confirms are not enabled; the returned confirm is dropped.
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                basic_properties(properties),
            )
            .await
            .map(|_confirm| ())
            .map_err(|e| BrokerError::Publish {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| subscribe_error(queue, &e))?;

        let stream = consumer.map(|item| {
            item.map(|delivery| Delivery {
                delivery_tag: delivery.delivery_tag,
                body: delivery.data,
                redelivered: delivery.redelivered,
            })
            .map_err(|e| BrokerError::Delivery {
                reason: e.to_string(),
            })
        });
        Ok(stream.boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Settle {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        let options = BasicNackOptions {
            multiple: false,
            requeue,
        };
        self.channel
            .basic_nack(delivery_tag, options)
            .await
            .map_err(|e| BrokerError::Settle {
                delivery_tag,
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| BrokerError::Channel {
                reason: format!("channel close failed: {e}"),
            })
    }
}
