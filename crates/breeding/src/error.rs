use thiserror::Error;

use herdbook_core::{Classify, ErrorKind};
use herdbook_herd::AnimalId;

/// Rejections raised by the bull aggregate and the dose ledger.
///
/// None of these leave partial state behind: the aggregate decides before
/// anything is appended.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreedingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown bull")]
    UnknownBull,

    #[error("bull already registered")]
    AlreadyRegistered,

    #[error("unknown executor")]
    UnknownExecutor,

    #[error("executor is inactive or not allowed to inseminate")]
    IneligibleExecutor,

    #[error("unknown animal {0}")]
    UnknownAnimal(AnimalId),

    #[error("animal {0} is archived")]
    ArchivedAnimal(AnimalId),

    #[error("insufficient doses: requested {requested}, remaining {remaining}")]
    InsufficientDoses { requested: u32, remaining: u32 },

    #[error("insemination not found")]
    EventNotFound,

    #[error("insemination already deleted")]
    AlreadyDeleted,

    #[error("a reason is required")]
    EmptyReason,

    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("write-off exceeds stock: requested {requested}, remaining {remaining}")]
    ExceedsStock { requested: u32, remaining: u32 },

    #[error("bull still has {0} doses in stock")]
    HasRemainingStock(u32),

    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("collaborator failed: {0}")]
    Remote(String),
}

impl BreedingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BreedingError::Validation(_) => "validation",
            BreedingError::UnknownBull => "unknown_bull",
            BreedingError::AlreadyRegistered => "already_registered",
            BreedingError::UnknownExecutor => "unknown_executor",
            BreedingError::IneligibleExecutor => "ineligible_executor",
            BreedingError::UnknownAnimal(_) => "unknown_animal",
            BreedingError::ArchivedAnimal(_) => "archived_animal",
            BreedingError::InsufficientDoses { .. } => "insufficient_doses",
            BreedingError::EventNotFound => "event_not_found",
            BreedingError::AlreadyDeleted => "already_deleted",
            BreedingError::EmptyReason => "empty_reason",
            BreedingError::InvalidQuantity => "invalid_quantity",
            BreedingError::ExceedsStock { .. } => "exceeds_stock",
            BreedingError::HasRemainingStock(_) => "has_remaining_stock",
            BreedingError::Conflict(_) => "conflict",
            BreedingError::Remote(_) => "remote",
        }
    }
}

impl Classify for BreedingError {
    fn kind(&self) -> ErrorKind {
        match self {
            BreedingError::Validation(_)
            | BreedingError::IneligibleExecutor
            | BreedingError::EmptyReason
            | BreedingError::InvalidQuantity => ErrorKind::Validation,
            BreedingError::UnknownBull
            | BreedingError::UnknownExecutor
            | BreedingError::UnknownAnimal(_)
            | BreedingError::EventNotFound => ErrorKind::NotFound,
            BreedingError::AlreadyRegistered
            | BreedingError::ArchivedAnimal(_)
            | BreedingError::InsufficientDoses { .. }
            | BreedingError::AlreadyDeleted
            | BreedingError::ExceedsStock { .. }
            | BreedingError::HasRemainingStock(_)
            | BreedingError::Conflict(_) => ErrorKind::Conflict,
            BreedingError::Remote(_) => ErrorKind::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_errors_are_conflicts() {
        let err = BreedingError::InsufficientDoses {
            requested: 3,
            remaining: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "insufficient_doses");
        assert_eq!(err.to_string(), "insufficient doses: requested 3, remaining 2");
    }

    #[test]
    fn input_errors_are_validation() {
        assert_eq!(BreedingError::EmptyReason.kind(), ErrorKind::Validation);
        assert_eq!(BreedingError::InvalidQuantity.kind(), ErrorKind::Validation);
        assert_eq!(BreedingError::EventNotFound.kind(), ErrorKind::NotFound);
    }
}
