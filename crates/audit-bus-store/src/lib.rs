//! Audit record persistence.
//!
//! The worker hands every decoded audit message to [`CreateAuditRecord`],
//! which validates it and stores it through an [`AuditRecordStore`]. Two
//! stores are provided:
//!
//! - [`JsonlStore`]: append-only JSON-lines file, used by the `audit-bus`
//!   binary
//! - [`InMemoryStore`]: process memory with failure injection, for tests
//!
//! Records are immutable once stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod store;
pub mod use_cases;

pub use error::{Result, StoreError};
pub use jsonl::JsonlStore;
pub use memory::InMemoryStore;
pub use store::AuditRecordStore;
pub use use_cases::{CreateAuditRecord, ListAuditRecords, ListFilter, DEFAULT_LIST_LIMIT};
