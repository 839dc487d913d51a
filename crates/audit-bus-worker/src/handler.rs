//! Per-message handling and the ack/nack decision.

use std::fmt::Debug;

use async_trait::async_trait;
use audit_bus_core::AuditMessage;
use audit_bus_store::{CreateAuditRecord, StoreError};
use thiserror::Error;

/// Why a message could not be handled.
#[derive(Error, Debug)]
pub enum HandleError {
    /// The body is not JSON. Redelivery cannot help.
    #[error("malformed audit message: {0}")]
    Malformed(#[source] audit_bus_core::Error),

    /// The body is JSON but was not accepted as an audit record.
    #[error("rejected audit message: {0}")]
    Invalid(#[source] audit_bus_core::Error),

    /// The record could not be stored.
    #[error("failed to persist audit record: {0}")]
    Persistence(#[source] StoreError),
}

impl From<audit_bus_core::Error> for HandleError {
    fn from(err: audit_bus_core::Error) -> Self {
        match err {
            audit_bus_core::Error::Malformed(_) => Self::Malformed(err),
            other => Self::Invalid(other),
        }
    }
}

impl From<StoreError> for HandleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => Self::Invalid(errors.into()),
            other => Self::Persistence(other),
        }
    }
}

impl HandleError {
    /// How the delivery should be settled after this error.
    ///
    /// Only a body that is not JSON is dropped. Every other failure is
    /// requeued, including bodies that will never validate.
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Malformed(_) => Disposition::Reject,
            Self::Invalid(_) | Self::Persistence(_) => Disposition::Requeue,
        }
    }
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge; the message is done.
    Ack,

    /// Negative-acknowledge without requeue; the message is dropped.
    Reject,

    /// Negative-acknowledge with requeue; the message will be redelivered.
    Requeue,
}

impl Disposition {
    /// Maps a handler outcome to its disposition.
    pub const fn of(result: &Result<(), HandleError>) -> Self {
        match result {
            Ok(()) => Self::Ack,
            Err(e) => e.disposition(),
        }
    }
}

/// Handles one delivery body.
#[async_trait]
pub trait MessageHandler: Send + Sync + Debug {
    /// Processes `body` to completion.
    async fn handle(&self, body: &[u8]) -> Result<(), HandleError>;
}

/// Decodes audit envelopes and persists them as audit records.
#[derive(Debug, Clone)]
pub struct AuditRecordHandler {
    create: CreateAuditRecord,
}

impl AuditRecordHandler {
    /// Creates a handler persisting through `create`.
    pub const fn new(create: CreateAuditRecord) -> Self {
        Self { create }
    }
}

#[async_trait]
impl MessageHandler for AuditRecordHandler {
    async fn handle(&self, body: &[u8]) -> Result<(), HandleError> {
        let message = AuditMessage::from_json(body)?;
        self.create.execute(message.into_new_record()).await?;
        Ok(())
    }
}
