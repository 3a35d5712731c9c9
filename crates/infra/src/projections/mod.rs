//! Read model builders.
//!
//! Each projection consumes published envelopes, skips replays via
//! per-stream cursors and keeps its rows in a farm-isolated store. All of
//! them can be rebuilt from the event stream.

use std::sync::Arc;

use herdbook_breeding::{BullId, InseminationId};
use herdbook_core::UserId;
use herdbook_events::EventEnvelope;
use herdbook_herd::AnimalId;

use crate::read_model::InMemoryFarmStore;

pub mod animals;
pub mod bulls;
pub mod cursors;
pub mod inseminations;
pub mod replay;
pub mod users;

pub use animals::{AnimalReadModel, AnimalsProjection};
pub use bulls::{BullReadModel, BullsProjection};
pub use cursors::StreamCursors;
pub use inseminations::{DELETED_USER_PLACEHOLDER, InseminationReadModel, InseminationsProjection};
pub use replay::{ReplayError, ReplaySummary, replay};
pub use users::{UserReadModel, UsersProjection};

/// Stream type names, used both when appending and when routing envelopes.
pub mod aggregate_types {
    pub const ANIMAL: &str = "herd.animal";
    pub const BULL: &str = "breeding.bull";
    pub const USER: &str = "auth.user";

    pub const ALL: [&str; 3] = [ANIMAL, BULL, USER];
}

pub type InMemoryAnimals = AnimalsProjection<InMemoryFarmStore<AnimalId, AnimalReadModel>>;
pub type InMemoryBulls = BullsProjection<InMemoryFarmStore<BullId, BullReadModel>>;
pub type InMemoryInseminations =
    InseminationsProjection<InMemoryFarmStore<InseminationId, InseminationReadModel>>;
pub type InMemoryUsers = UsersProjection<InMemoryFarmStore<UserId, UserReadModel>>;

/// Every read model of the application, fed from one bus subscription.
#[derive(Clone)]
pub struct ReadModels {
    pub animals: Arc<InMemoryAnimals>,
    pub bulls: Arc<InMemoryBulls>,
    pub inseminations: Arc<InMemoryInseminations>,
    pub users: Arc<InMemoryUsers>,
}

impl ReadModels {
    pub fn in_memory() -> Self {
        Self {
            animals: Arc::new(AnimalsProjection::new(InMemoryFarmStore::new())),
            bulls: Arc::new(BullsProjection::new(InMemoryFarmStore::new())),
            inseminations: Arc::new(InseminationsProjection::new(InMemoryFarmStore::new())),
            users: Arc::new(UsersProjection::new(InMemoryFarmStore::new())),
        }
    }

    /// Route one envelope to every projection. All of them see it even when
    /// one fails; the first error is returned.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<serde_json::Value>) -> anyhow::Result<()> {
        let results = [
            self.animals.apply_envelope(envelope),
            self.bulls.apply_envelope(envelope),
            self.inseminations.apply_envelope(envelope),
            self.users.apply_envelope(envelope),
        ];
        results.into_iter().collect()
    }
}
