//! Shared broker connection management.
//!
//! One [`ConnectionManager`] is constructed per process by its composition
//! root and shared by `Arc` with the publisher and the consumer. It owns the
//! only connection/channel pair; every channel operation goes through its
//! lock, since the underlying channel is not safe for concurrent use.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::topology::{QueueHandle, QueueTopology};
use crate::transport::{BrokerChannel, BrokerConnection, DeliveryStream, MessageProperties, Transport};

/// The open connection/channel pair.
#[derive(Debug)]
struct Link {
    connection: Box<dyn BrokerConnection>,
    channel: Box<dyn BrokerChannel>,
    declared: HashSet<String>,
}

impl Link {
    fn is_open(&self) -> bool {
        self.connection.is_open() && self.channel.is_open()
    }
}

/// Owns the process-wide broker connection and channel.
#[derive(Debug)]
pub struct ConnectionManager {
    config: BrokerConfig,
    transport: Arc<dyn Transport>,
    link: Mutex<Option<Link>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager. No I/O happens until first use.
    pub fn new(config: BrokerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            link: Mutex::new(None),
        }
    }

    /// Returns the broker configuration.
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Connects if not already connected.
    ///
    /// Concurrent callers serialize on the internal lock, so at most one
    /// connection and one channel are created. The channel prefetch is set to
    /// the configured value (1 by default).
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await
    }

    /// Connects only if no open connection exists.
    ///
    /// Called before every publish and before subscribing.
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(Link::is_open) {
            return Ok(());
        }
        self.connect_locked(&mut link).await
    }

    /// Attempts to connect at process startup without failing it.
    ///
    /// Returns whether the connection is up. Business services call this
    /// once; a broker outage only means audit publishing will keep retrying
    /// the connection lazily.
    pub async fn warm_up(&self) -> bool {
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    url = %self.config.redacted_url(),
                    error = %e,
                    "Broker unavailable at startup; audit events will not be published until it recovers"
                );
                false
            }
        }
    }

    /// Returns true if an open connection and channel exist.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(Link::is_open)
    }

    /// Closes the channel, then the connection. Idempotent; close errors are
    /// logged and swallowed.
    pub async fn disconnect(&self) {
        let Some(link) = self.link.lock().await.take() else {
            debug!("Disconnect requested with no open connection");
            return;
        };

        if let Err(e) = link.channel.close().await {
            warn!(error = %e, "Error closing broker channel");
        }
        if let Err(e) = link.connection.close().await {
            warn!(error = %e, "Error closing broker connection");
        }
        info!(url = %self.config.redacted_url(), "Disconnected from broker");
    }

    /// Declares (or returns the already declared) durable queue for `topology`.
    pub async fn queue_handle(&self, topology: &QueueTopology) -> Result<QueueHandle> {
        let mut guard = self.link.lock().await;
        let link = self.open_link(&mut guard).await?;

        if !link.declared.contains(&topology.name) {
            link.channel.declare_queue(topology).await?;
            link.declared.insert(topology.name.clone());
            debug!(
                queue = %topology.name,
                ttl_ms = topology.ttl_millis(),
                max_length = topology.max_length,
                "Declared queue"
            );
        }
        Ok(QueueHandle::new(&topology.name))
    }

    /// Publishes `payload` to the queue behind `handle`.
    pub async fn publish(
        &self,
        handle: &QueueHandle,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<()> {
        let mut guard = self.link.lock().await;
        let link = self.open_link(&mut guard).await?;
        link.channel.publish(handle.name(), payload, properties).await
    }

    /// Starts a manual-ack subscription on the queue behind `handle`.
    pub async fn subscribe(&self, handle: &QueueHandle, consumer_tag: &str) -> Result<DeliveryStream> {
        let mut guard = self.link.lock().await;
        let link = self.open_link(&mut guard).await?;
        let stream = link.channel.consume(handle.name(), consumer_tag).await?;
        info!(queue = %handle.name(), consumer_tag, "Subscribed");
        Ok(stream)
    }

    /// Acknowledges a delivery on the current channel.
    ///
    /// Never reconnects: delivery tags are only meaningful on the channel that
    /// issued them.
    pub async fn ack(&self, delivery_tag: u64) -> Result<()> {
        let guard = self.link.lock().await;
        Self::current(&guard)?.channel.ack(delivery_tag).await
    }

    /// Rejects a delivery on the current channel, optionally requeueing it.
    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        let guard = self.link.lock().await;
        Self::current(&guard)?.channel.nack(delivery_tag, requeue).await
    }

    fn current(slot: &Option<Link>) -> Result<&Link> {
        slot.as_ref()
            .filter(|link| link.is_open())
            .ok_or(BrokerError::NotConnected)
    }

    async fn open_link<'a>(&self, slot: &'a mut Option<Link>) -> Result<&'a mut Link> {
        if !slot.as_ref().is_some_and(Link::is_open) {
            self.connect_locked(slot).await?;
        }
        slot.as_mut().ok_or(BrokerError::NotConnected)
    }

    async fn connect_locked(&self, slot: &mut Option<Link>) -> Result<()> {
        if slot.as_ref().is_some_and(Link::is_open) {
            return Ok(());
        }

        if let Some(stale) = slot.take() {
            debug!("Discarding closed broker connection");
            let _ = stale.channel.close().await;
            let _ = stale.connection.close().await;
        }

        let url = self.config.redacted_url();
        let connection = match self.transport.connect(&self.config.url).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(url = %url, error = %e, "Broker connection failed");
                return Err(e);
            }
        };

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        };

        if let Err(e) = channel.set_prefetch(self.config.prefetch).await {
            let _ = channel.close().await;
            let _ = connection.close().await;
            return Err(e);
        }

        info!(
            url = %url,
            transport = self.transport.name(),
            prefetch = self.config.prefetch,
            "Connected to broker"
        );
        *slot = Some(Link {
            connection,
            channel,
            declared: HashSet::new(),
        });
        Ok(())
    }
}
