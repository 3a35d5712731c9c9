//! Seams between the dose ledger and the parts of the system it consults.
//!
//! The ledger never reaches into user or animal state directly; it asks a
//! [`UserDirectory`] who the executor is and an [`AnimalRegistry`] what state
//! an animal is in, and tells the registry about breedings after a commit.

use chrono::NaiveDate;
use thiserror::Error;

use herdbook_auth::Role;
use herdbook_core::{FarmId, UserId};
use herdbook_herd::{AnimalId, AnimalStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or its storage failed.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// A user as the directory sees them at the moment of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
}

impl DirectoryEntry {
    pub fn can_execute_insemination(&self) -> bool {
        self.active && self.role.can_inseminate()
    }
}

pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when the user does not exist in `farm_id` (never created,
    /// hard-deleted, or belonging to another farm).
    fn lookup(&self, farm_id: FarmId, user_id: UserId) -> Result<Option<DirectoryEntry>, CollaboratorError>;
}

pub trait AnimalRegistry: Send + Sync {
    /// `Ok(None)` for an animal the farm does not have.
    fn status(&self, farm_id: FarmId, animal_id: AnimalId) -> Result<Option<AnimalStatus>, CollaboratorError>;

    fn set_breeding_date(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError>;

    /// Undo one breeding recorded for `date`.
    fn revert_breeding(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError>;
}

impl<T: UserDirectory + ?Sized> UserDirectory for std::sync::Arc<T> {
    fn lookup(&self, farm_id: FarmId, user_id: UserId) -> Result<Option<DirectoryEntry>, CollaboratorError> {
        (**self).lookup(farm_id, user_id)
    }
}

impl<T: AnimalRegistry + ?Sized> AnimalRegistry for std::sync::Arc<T> {
    fn status(&self, farm_id: FarmId, animal_id: AnimalId) -> Result<Option<AnimalStatus>, CollaboratorError> {
        (**self).status(farm_id, animal_id)
    }

    fn set_breeding_date(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError> {
        (**self).set_breeding_date(farm_id, animal_id, date)
    }

    fn revert_breeding(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError> {
        (**self).revert_breeding(farm_id, animal_id, date)
    }
}
