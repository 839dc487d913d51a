//! Audit event publishing for business services.
//!
//! Business services report what they did as [`AuditEvent`]s; the
//! [`EventPublisher`] wraps each one in the wire envelope (adding the service
//! identity and a timestamp) and sends it, persistently, to the durable
//! `audit_events` queue.
//!
//! Publishing never fails the caller's operation. Every failure is logged at
//! `warn` and returned as a [`PublishError`], which the caller may ignore.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audit_bus_broker::{AmqpTransport, BrokerConfig, ConnectionManager};
//! use audit_bus_core::{Action, AuditEvent};
//! use audit_bus_publisher::{AuditPublisher, EventPublisher};
//!
//! let manager = Arc::new(ConnectionManager::new(
//!     BrokerConfig::from_env(),
//!     Arc::new(AmqpTransport::new()),
//! ));
//! manager.warm_up().await;
//!
//! let publisher = EventPublisher::new(manager);
//! let event = AuditEvent::success("cliente", Some(42), Action::Create, "Cliente creado");
//! let _ = publisher.publish(&event).await;
//! ```
//!
//! [`AuditEvent`]: audit_bus_core::AuditEvent

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod error;
mod publisher;
mod recording;

pub use error::{PublishError, Result};
pub use publisher::{AuditPublisher, BatchOutcome, EventPublisher, PublishReceipt};
pub use recording::RecordingPublisher;
