//! Audit event definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::validation::{Validate, ValidationErrors};

/// Operation performed on the audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Entity was created
    Create,
    /// Entity was read
    Read,
    /// Entity was updated
    Update,
    /// Entity was deleted
    Delete,
    /// A collection of entities was listed
    List,
}

impl Action {
    /// All actions, in wire order.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::List,
    ];

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::List => "LIST",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
}

impl Status {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            _ => Err(Error::UnknownVariant {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// An audit event as reported by a business service.
///
/// The publishing service's identity is not part of the event; the publisher
/// attaches it when building the wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Logical kind of subject (e.g. "cliente", "factura")
    pub entity_type: String,

    /// Subject identifier; `None` for list/aggregate operations
    pub entity_id: Option<i64>,

    /// Operation performed
    pub action: Action,

    /// Human-readable description
    pub details: String,

    /// Operation outcome
    pub status: Status,

    /// Business-event time; the publisher uses publish time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AuditEvent {
    /// Creates a new event without a timestamp.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: Option<i64>,
        action: Action,
        details: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action,
            details: details.into(),
            status,
            timestamp: None,
        }
    }

    /// Creates an event reporting a successful operation.
    #[must_use]
    pub fn success(
        entity_type: impl Into<String>,
        entity_id: Option<i64>,
        action: Action,
        details: impl Into<String>,
    ) -> Self {
        Self::new(entity_type, entity_id, action, details, Status::Success)
    }

    /// Creates an event reporting a failed operation.
    #[must_use]
    pub fn failure(
        entity_type: impl Into<String>,
        entity_id: Option<i64>,
        action: Action,
        details: impl Into<String>,
    ) -> Self {
        Self::new(entity_type, entity_id, action, details, Status::Error)
    }

    /// Sets the business-event time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl Validate for AuditEvent {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_non_blank("entity_type", &self.entity_type);
        errors.require_non_blank("details", &self.details);
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        assert_eq!(serde_json::to_string(&Action::Create).unwrap(), "\"CREATE\"");
        assert_eq!(serde_json::to_string(&Action::List).unwrap(), "\"LIST\"");
        let parsed: Action = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(parsed, Action::Delete);
    }

    #[test]
    fn test_action_rejects_unknown_on_the_wire() {
        assert!(serde_json::from_str::<Action>("\"PURGE\"").is_err());
        assert!(serde_json::from_str::<Action>("\"create\"").is_err());
    }

    #[test]
    fn test_action_from_str_case_insensitive() {
        assert_eq!("create".parse::<Action>().unwrap(), Action::Create);
        assert_eq!(" Update ".parse::<Action>().unwrap(), Action::Update);
        assert!("purge".parse::<Action>().is_err());
    }

    #[test]
    fn test_status_round_trip_text() {
        assert_eq!("success".parse::<Status>().unwrap(), Status::Success);
        assert_eq!(Status::Error.to_string(), "ERROR");
        assert!("FAILED".parse::<Status>().is_err());
    }

    #[test]
    fn test_success_and_failure_constructors() {
        let ok = AuditEvent::success("cliente", Some(7), Action::Create, "Cliente creado: Acme");
        assert_eq!(ok.status, Status::Success);
        assert!(ok.timestamp.is_none());

        let err = AuditEvent::failure("factura", None, Action::List, "Error al listar facturas");
        assert_eq!(err.status, Status::Error);
        assert_eq!(err.entity_id, None);
    }

    #[test]
    fn test_validate_blank_fields() {
        let event = AuditEvent::success(" ", Some(1), Action::Read, "");
        let errors = event.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("entity_type"));
        assert!(errors.has_field("details"));
    }

    #[test]
    fn test_validate_accepts_null_entity_id() {
        let event = AuditEvent::failure("cliente", None, Action::List, "Error al listar clientes");
        assert!(event.is_valid());
    }
}
