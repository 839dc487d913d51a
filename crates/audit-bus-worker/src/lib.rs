//! Audit Bus Worker
//!
//! Consumes audit messages from the `audit_events` queue and persists them as
//! audit records.
//!
//! # Overview
//!
//! - [`EventConsumer`]: the receive loop, with bounded connection retry,
//!   manual acknowledgment and graceful shutdown
//! - [`ReconnectPolicy`]: fixed or capped-exponential retry schedule
//! - [`MessageHandler`] / [`AuditRecordHandler`]: decode and persist one
//!   message, classifying failures into a [`Disposition`]
//!
//! | handler outcome | settlement |
//! |---|---|
//! | stored | ack |
//! | body is not JSON | nack, dropped |
//! | JSON that is not a valid record | nack, requeued |
//! | store failure | nack, requeued |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audit_bus_worker::{AuditRecordHandler, EventConsumer, WorkerConfig};
//!
//! let consumer = EventConsumer::new(manager, Arc::new(handler), WorkerConfig::default());
//! consumer.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::significant_drop_tightening)]

pub mod consumer;
pub mod error;
pub mod handler;
pub mod retry;
pub mod state;

pub use consumer::{ConsumerStats, EventConsumer, WorkerConfig, DEFAULT_CONSUMER_TAG};
pub use error::{Result, WorkerError};
pub use handler::{AuditRecordHandler, Disposition, HandleError, MessageHandler};
pub use retry::{Backoff, ReconnectPolicy, ReconnectState, RetryDecision};
pub use state::ConsumerState;
