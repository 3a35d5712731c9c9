//! Animal registry over the event-sourced `Animal` aggregate.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use herdbook_core::{DomainError, FarmId};
use herdbook_events::{EventBus, EventEnvelope};
use herdbook_herd::{
    Animal, AnimalCommand, AnimalId, AnimalStatus, ArchiveAnimal, RecordBreeding, RegisterAnimal,
    RevertBreeding,
};

use crate::collaborators::{AnimalRegistry, CollaboratorError};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::aggregate_types;

pub type HerdResult<T> = Result<T, DispatchError<DomainError>>;

/// Breeding signals race only with other signals for the same animal.
const SIGNAL_ATTEMPTS: u32 = 3;

/// Registration details of a new animal.
#[derive(Debug, Clone, Default)]
pub struct NewAnimal {
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: Option<String>,
}

pub struct HerdRegistry<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for HerdRegistry<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> HerdRegistry<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn load(&self, farm_id: FarmId, animal_id: AnimalId) -> HerdResult<Animal> {
        self.dispatcher
            .load(farm_id, animal_id.0, |_, id| Animal::empty(AnimalId::new(id)))
    }

    pub fn register_animal(&self, farm_id: FarmId, new: NewAnimal) -> HerdResult<Animal> {
        let animal_id = AnimalId::generate();
        let animal = self.execute(
            farm_id,
            animal_id,
            AnimalCommand::Register(RegisterAnimal {
                farm_id,
                animal_id,
                ear_tag: new.ear_tag,
                name: new.name,
                breed: new.breed,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %animal_id, ear_tag = animal.ear_tag(), "animal registered");
        Ok(animal)
    }

    pub fn archive_animal(&self, farm_id: FarmId, animal_id: AnimalId, reason: &str) -> HerdResult<Animal> {
        let animal = self.execute(
            farm_id,
            animal_id,
            AnimalCommand::Archive(ArchiveAnimal {
                farm_id,
                animal_id,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
        )?;
        info!(%farm_id, %animal_id, "animal archived");
        Ok(animal)
    }

    fn execute(&self, farm_id: FarmId, animal_id: AnimalId, command: AnimalCommand) -> HerdResult<Animal> {
        self.dispatcher
            .dispatch(farm_id, animal_id.0, aggregate_types::ANIMAL, command, |_, id| {
                Animal::empty(AnimalId::new(id))
            })
            .map(|out| out.aggregate)
    }

    fn signal(&self, farm_id: FarmId, animal_id: AnimalId, command: AnimalCommand) -> Result<(), CollaboratorError> {
        let mut attempt = 1;
        loop {
            match self.execute(farm_id, animal_id, command.clone()) {
                Ok(_) => return Ok(()),
                Err(DispatchError::Concurrency(msg)) if attempt < SIGNAL_ATTEMPTS => {
                    warn!(%farm_id, %animal_id, attempt, %msg, "animal stream moved on; retrying");
                    attempt += 1;
                }
                Err(DispatchError::Rejected(e)) => return Err(CollaboratorError::Rejected(e.to_string())),
                Err(e) => return Err(CollaboratorError::Unavailable(e.to_string())),
            }
        }
    }
}

impl<S, B> AnimalRegistry for HerdRegistry<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn status(&self, farm_id: FarmId, animal_id: AnimalId) -> Result<Option<AnimalStatus>, CollaboratorError> {
        let animal = self
            .load(farm_id, animal_id)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        if !animal.exists() || animal.farm_id() != Some(farm_id) {
            return Ok(None);
        }
        Ok(Some(animal.status()))
    }

    fn set_breeding_date(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError> {
        self.signal(
            farm_id,
            animal_id,
            AnimalCommand::RecordBreeding(RecordBreeding {
                farm_id,
                animal_id,
                date,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn revert_breeding(&self, farm_id: FarmId, animal_id: AnimalId, date: NaiveDate) -> Result<(), CollaboratorError> {
        self.signal(
            farm_id,
            animal_id,
            AnimalCommand::RevertBreeding(RevertBreeding {
                farm_id,
                animal_id,
                date,
                occurred_at: Utc::now(),
            }),
        )
    }
}
