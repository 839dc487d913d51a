//! # Audit Bus Core
//!
//! Core types shared by every part of the audit bus:
//!
//! - [`AuditEvent`] - what a business service reports after (or instead of)
//!   its primary operation
//! - [`AuditMessage`] - the JSON envelope that travels through the queue
//! - [`AuditRecord`] / [`NewAuditRecord`] - the persisted form, owned by the
//!   downstream store
//! - [`validation`] - non-empty field checks shared by all three
//!
//! ## Example
//!
//! ```rust
//! use audit_bus_core::{Action, AuditEvent, AuditMessage};
//!
//! let event = AuditEvent::success("cliente", Some(7), Action::Create, "Cliente creado: Acme");
//! let message = AuditMessage::from_event(&event, "clientes-service");
//!
//! assert_eq!(message.service, "clientes-service");
//! assert_eq!(message.entity_id, Some(7));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod message;
pub mod record;
pub mod validation;

#[cfg(test)]
mod proptest_tests;

pub use error::{Error, Result};
pub use event::{Action, AuditEvent, Status};
pub use message::{format_timestamp, AuditMessage};
pub use record::{new_record_id, AuditRecord, NewAuditRecord};
pub use validation::{Validate, ValidationError, ValidationErrors};
