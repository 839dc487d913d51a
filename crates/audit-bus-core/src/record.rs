//! Persisted audit records.
//!
//! A record is the stored twin of an [`crate::AuditMessage`]: same fields,
//! linked only by equality, plus the `id` and `created_at` assigned by the
//! store. Records are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Timestamp, Uuid};

use crate::event::{Action, Status};
use crate::validation::{Validate, ValidationErrors};

/// Generates a new time-ordered id for an audit record.
#[must_use]
pub fn new_record_id() -> Uuid {
    let ts = Timestamp::now(uuid::NoContext);
    Uuid::new_v7(ts)
}

/// Input to the downstream "persist one audit record" operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    /// Logical kind of subject
    pub entity_type: String,

    /// Subject identifier
    pub entity_id: Option<i64>,

    /// Operation performed
    pub action: Action,

    /// Human-readable description
    pub details: String,

    /// Operation outcome
    pub status: Status,

    /// Business-event time; defaults to the storage time
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewAuditRecord {
    /// Assigns storage identity, producing the immutable record.
    #[must_use]
    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            details: self.details,
            status: self.status,
            timestamp: self.timestamp.unwrap_or(created_at),
            created_at,
        }
    }
}

impl Validate for NewAuditRecord {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_non_blank("entity_type", &self.entity_type);
        errors.require_non_blank("details", &self.details);
        errors.into_result()
    }
}

/// A stored audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned id
    pub id: Uuid,

    /// Logical kind of subject
    pub entity_type: String,

    /// Subject identifier
    pub entity_id: Option<i64>,

    /// Operation performed
    pub action: Action,

    /// Human-readable description
    pub details: String,

    /// Operation outcome
    pub status: Status,

    /// Business-event time
    pub timestamp: DateTime<Utc>,

    /// Storage time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(timestamp: Option<DateTime<Utc>>) -> NewAuditRecord {
        NewAuditRecord {
            entity_type: "factura".to_string(),
            entity_id: Some(42),
            action: Action::Create,
            details: "Factura creada".to_string(),
            status: Status::Success,
            timestamp,
        }
    }

    #[test]
    fn test_into_record_defaults_timestamp_to_created_at() {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let record = sample(None).into_record(new_record_id(), created_at);
        assert_eq!(record.timestamp, created_at);
        assert_eq!(record.created_at, created_at);
    }

    #[test]
    fn test_into_record_keeps_business_time() {
        let business = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let created_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let record = sample(Some(business)).into_record(new_record_id(), created_at);
        assert_eq!(record.timestamp, business);
    }

    #[test]
    fn test_record_ids_are_time_ordered() {
        let first = new_record_id();
        let second = new_record_id();
        assert_ne!(first, second);
        assert_eq!(first.get_version_num(), 7);
    }

    #[test]
    fn test_validate_blank_entity_type() {
        let mut record = sample(None);
        record.entity_type = String::new();
        assert!(record.validate().unwrap_err().has_field("entity_type"));
    }
}
