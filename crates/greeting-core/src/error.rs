use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::draft::DraftField;

/// Field-level validation failure raised before any request leaves the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: DraftField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: DraftField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.name(), self.message)
    }
}

/// Greeting lifecycle errors.
///
/// Everything except `Integrity` is either local (validation) or retryable.
#[derive(Debug, Error)]
pub enum GreetingError {
    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Verification mismatch: {0}")]
    VerificationMismatch(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Response already recorded at {accepted_at}")]
    AlreadyResolved { accepted_at: DateTime<Utc> },

    /// Persisted ledger failed verification. Retrying cannot help.
    #[error("Ledger integrity failure: {0}")]
    Integrity(String),
}

impl GreetingError {
    pub fn invalid(field: DraftField, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn greeting_not_found(id: &str) -> Self {
        Self::NotFound(format!("greeting '{}' not found", id))
    }

    pub fn storage(context: &str, err: impl fmt::Display) -> Self {
        Self::Transient(format!("{context}: {err}"))
    }

    /// True when the caller may safely resubmit the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::VerificationMismatch(_) | Self::AlreadyResolved { .. }
        )
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = GreetingError::Validation(vec![
            FieldError::new(DraftField::SenderName, "required"),
            FieldError::new(DraftField::Message, "too long"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("sender_name: required"));
        assert!(rendered.contains("message: too long"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn integrity_failures_are_not_retryable() {
        let err = GreetingError::Integrity("entry 2 hash mismatch".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Ledger integrity failure: entry 2 hash mismatch");
    }

    #[test]
    fn transient_failures_are_retryable() {
        let err = GreetingError::storage("postgres insert failed", "connection reset");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Transient failure: postgres insert failed: connection reset"
        );
    }
}
