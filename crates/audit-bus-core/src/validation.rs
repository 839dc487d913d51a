//! Validation framework for audit bus types.
//!
//! Every representation of an audit entry (caller event, wire message,
//! persisted record) enforces the same non-empty field rules through
//! [`Validate`].

use std::fmt;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// A human-readable description of the validation failure.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for an empty or blank value.
    ///
    /// # Examples
    ///
    /// ```
    /// use audit_bus_core::ValidationError;
    ///
    /// let error = ValidationError::empty("details");
    /// assert_eq!(error.field, "details");
    /// assert_eq!(error.message, "'details' must not be empty");
    /// ```
    pub fn empty(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("'{field}' must not be empty"),
            field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A collection of validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Creates an empty validation errors collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validation error to the collection.
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Records an [`ValidationError::empty`] error if `value` is blank.
    pub fn require_non_blank(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(ValidationError::empty(field));
        }
    }

    /// Returns true if there are no validation errors.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of validation errors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns an iterator over the validation errors.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Returns true if any error concerns `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Converts to a `Result`, returning `Ok(())` if no errors were collected.
    ///
    /// # Errors
    ///
    /// Returns `self` if it holds at least one error.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<T: IntoIterator<Item = ValidationError>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "no validation errors"),
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} validation errors: ", errors.len())?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// Trait for types that can be validated.
pub trait Validate {
    /// Validates this instance and returns every violation found.
    ///
    /// # Errors
    ///
    /// Returns `ValidationErrors` containing all failures.
    fn validate(&self) -> Result<(), ValidationErrors>;

    /// Returns true if validation passes.
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_non_blank_rejects_whitespace() {
        let mut errors = ValidationErrors::new();
        errors.require_non_blank("details", "   ");
        errors.require_non_blank("entity_type", "cliente");

        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("details"));
        assert!(!errors.has_field("entity_type"));
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let errors: ValidationErrors = vec![ValidationError::empty("details")].into_iter().collect();
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_display_multiple() {
        let errors: ValidationErrors = vec![
            ValidationError::empty("entity_type"),
            ValidationError::empty("details"),
        ]
        .into_iter()
        .collect();

        let text = errors.to_string();
        assert!(text.starts_with("2 validation errors"));
        assert!(text.contains("entity_type"));
        assert!(text.contains("details"));
    }
}
