//! Wire envelope for audit events.
//!
//! The JSON body published to the queue has the shape:
//!
//! ```text
//! { "entity_type": string, "entity_id": int|null, "action": string,
//!   "details": string, "status": string, "timestamp": ISO-8601 string,
//!   "service": string }
//! ```

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::{Action, AuditEvent, Status};
use crate::record::NewAuditRecord;
use crate::validation::{Validate, ValidationErrors};

/// Formats a timestamp as ISO-8601 UTC with second precision (`2025-01-01T10:00:00Z`).
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

fn decode_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// An audit event as it travels through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMessage {
    /// Logical kind of subject
    pub entity_type: String,

    /// Subject identifier, serialized as `null` when absent
    pub entity_id: Option<i64>,

    /// Operation performed
    pub action: Action,

    /// Human-readable description
    pub details: String,

    /// Operation outcome
    pub status: Status,

    /// Business-event time. A body without one decodes to the decode time.
    #[serde(with = "iso8601", default = "decode_time")]
    pub timestamp: DateTime<Utc>,

    /// Identity of the publishing service
    #[serde(default)]
    pub service: String,
}

impl AuditMessage {
    /// Builds the envelope for `event`, stamping it with `service` and
    /// defaulting the timestamp to now.
    #[must_use]
    pub fn from_event(event: &AuditEvent, service: &str) -> Self {
        Self::from_event_at(event, service, Utc::now())
    }

    /// Builds the envelope using `now` as the default timestamp.
    ///
    /// Timestamps are truncated to whole seconds so that the envelope equals
    /// its own decoded body.
    #[must_use]
    pub fn from_event_at(event: &AuditEvent, service: &str, now: DateTime<Utc>) -> Self {
        Self {
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id,
            action: event.action,
            details: event.details.clone(),
            status: event.status,
            timestamp: event.timestamp.unwrap_or(now).trunc_subsecs(0),
            service: service.to_string(),
        }
    }

    /// Serializes the envelope to its JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes and validates a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the body is not JSON,
    /// [`crate::Error::Shape`] if it is JSON but not an envelope (missing
    /// fields, unknown action/status, bad timestamp) and
    /// [`crate::Error::Invalid`] if a required field is blank.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let message: Self = serde_json::from_value(value).map_err(Error::Shape)?;
        message.validate()?;
        Ok(message)
    }

    /// Returns the caller-facing event this envelope carries.
    #[must_use]
    pub fn to_event(&self) -> AuditEvent {
        AuditEvent {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id,
            action: self.action,
            details: self.details.clone(),
            status: self.status,
            timestamp: Some(self.timestamp),
        }
    }

    /// Converts the envelope into the record handed to the downstream store.
    #[must_use]
    pub fn into_new_record(self) -> NewAuditRecord {
        NewAuditRecord {
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            details: self.details,
            status: self.status,
            timestamp: Some(self.timestamp),
        }
    }
}

impl Validate for AuditMessage {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_non_blank("entity_type", &self.entity_type);
        errors.require_non_blank("details", &self.details);
        errors.into_result()
    }
}
