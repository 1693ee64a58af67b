//! Error types shared by the domain model.

use thiserror::Error;

/// Result type for core domain operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while validating or transitioning domain entities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A field failed validation; carries the field name and reason.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// An incident invariant would have been violated.
    #[error("incident invariant violated: {0}")]
    InvariantViolation(String),

    /// A referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// An operation conflicts with current state (e.g. duplicate open incident).
    #[error("conflict: {0}")]
    Conflict(String),
}
