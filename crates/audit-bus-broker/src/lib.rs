//! Audit Bus Broker
//!
//! Broker plumbing shared by the audit event publisher and consumer.
//!
//! # Overview
//!
//! - **Transport**: [`Transport`] / [`BrokerConnection`] / [`BrokerChannel`]
//!   traits, with an AMQP implementation ([`AmqpTransport`], backed by
//!   `lapin`) and an in-process one ([`MemoryTransport`]) for tests
//! - **Connection management**: [`ConnectionManager`] owns the single
//!   connection/channel pair of a process and serializes channel access
//! - **Topology**: [`QueueTopology`] describes the durable, bounded
//!   `audit_events` queue
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audit_bus_broker::{AmqpTransport, BrokerConfig, ConnectionManager, QueueTopology};
//!
//! let manager = Arc::new(ConnectionManager::new(
//!     BrokerConfig::from_env(),
//!     Arc::new(AmqpTransport::new()),
//! ));
//! manager.connect().await?;
//! let queue = manager.queue_handle(&QueueTopology::audit_events()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::significant_drop_tightening)]

pub mod amqp;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod topology;
pub mod transport;

pub use amqp::AmqpTransport;
pub use config::BrokerConfig;
pub use connection::ConnectionManager;
pub use error::{BrokerError, ConnectionError, Result};
pub use memory::{MemoryBroker, MemoryTransport, PublishedMessage};
pub use topology::{QueueHandle, QueueTopology, AUDIT_QUEUE};
pub use transport::{
    BrokerChannel, BrokerConnection, Delivery, DeliveryStream, MessageProperties, Transport,
};
