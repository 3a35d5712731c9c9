//! Domain error model.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error classification surfaced to callers.
///
/// Every rejection in the workspace maps onto exactly one of these; the HTTP
/// layer turns them into status codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// The caller's role (or account state) does not allow the action.
    Authorization,
    /// A referenced entity does not exist.
    NotFound,
    /// The action conflicts with current state (stock, lifecycle, versions).
    Conflict,
    /// The persistence collaborator failed.
    Remote,
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Domain-level error for aggregates without a dedicated error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

impl Classify for DomainError {
    fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::InvariantViolation(_) | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::NotFound => ErrorKind::NotFound,
            DomainError::Unauthorized => ErrorKind::Authorization,
        }
    }
}
