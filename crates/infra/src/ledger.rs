//! Dose ledger: the only writer of a bull's semen stock.
//!
//! Every mutation is one command against the bull's stream, so the dose
//! count and the insemination records it pays for commit together. On a
//! version conflict the bull is reloaded and every precondition re-checked
//! before the next attempt; after `max_attempts` the call fails with
//! [`BreedingError::Conflict`]. Stock is never overwritten blindly.
//!
//! Collaborators are consulted before the append (executor, animal states)
//! and told about breedings after it. A failed after-commit signal is logged
//! and does not undo the committed stock change.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use herdbook_breeding::{
    BreedingError, Bull, BullCommand, BullEvent, BullId, ConsumeDoses, InseminationId,
    InseminationRecord, RegisterBull, RemoveBull, ReverseInsemination, WriteOffDoses,
};
use herdbook_core::{FarmId, UserId};
use herdbook_events::{EventBus, EventEnvelope};
use herdbook_herd::{AnimalId, AnimalStatus};

use crate::collaborators::{AnimalRegistry, CollaboratorError, UserDirectory};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::event_store::EventStore;
use crate::projections::aggregate_types;
use crate::read_model::{FarmStore, InMemoryFarmStore};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Attempts per mutation when the bull's stream moved on concurrently.
    pub max_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Which bull's stream holds an insemination.
///
/// Written synchronously after each commit so a record can be reversed (or
/// re-classified) immediately, without waiting for projections. Filled from
/// the store at start-up through [`InseminationIndex::apply_envelope`].
#[derive(Debug, Clone, Default)]
pub struct InseminationIndex {
    inner: Arc<InMemoryFarmStore<InseminationId, BullId>>,
}

impl InseminationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bull_of(&self, farm_id: FarmId, insemination_id: InseminationId) -> Option<BullId> {
        self.inner.get(farm_id, &insemination_id)
    }

    pub fn record(&self, farm_id: FarmId, insemination_id: InseminationId, bull_id: BullId) {
        self.inner.upsert(farm_id, insemination_id, bull_id);
    }

    /// Rebuild entries from a bull's committed events.
    pub fn index_events(&self, farm_id: FarmId, events: &[BullEvent]) {
        for event in events {
            if let BullEvent::DosesConsumed(e) = event {
                for record in &e.records {
                    self.record(farm_id, record.id, e.bull_id);
                }
            }
        }
    }

    /// Index a stored bull event; other streams are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> anyhow::Result<()> {
        if envelope.aggregate_type() != aggregate_types::BULL {
            return Ok(());
        }
        let event: BullEvent = serde_json::from_value(envelope.payload().clone())?;
        self.index_events(envelope.farm_id(), std::slice::from_ref(&event));
        Ok(())
    }
}

/// Registration details of a bull's semen batch.
#[derive(Debug, Clone)]
pub struct NewBull {
    pub code: String,
    pub name: String,
    /// Minor currency units.
    pub price_per_dose: u64,
    pub initial_doses: u32,
}

/// One breeding session: several animals, one bull, one executor.
#[derive(Debug, Clone)]
pub struct RecordInsemination {
    pub bull_id: BullId,
    pub animals: BTreeSet<AnimalId>,
    pub executor_id: UserId,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

pub struct DoseLedger<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    directory: Arc<dyn UserDirectory>,
    registry: Arc<dyn AnimalRegistry>,
    index: InseminationIndex,
    settings: LedgerSettings,
}

impl<S, B> DoseLedger<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        directory: Arc<dyn UserDirectory>,
        registry: Arc<dyn AnimalRegistry>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            registry,
            index: InseminationIndex::new(),
            settings,
        }
    }

    pub fn index(&self) -> &InseminationIndex {
        &self.index
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    /// Current state of a bull, as the ledger would see it.
    pub fn bull(&self, farm_id: FarmId, bull_id: BullId) -> Result<Bull, BreedingError> {
        let bull = self
            .dispatcher
            .load(farm_id, bull_id.0, |_, id| Bull::empty(BullId(id)))
            .map_err(into_breeding_error)?;
        if !bull.exists() || bull.farm_id() != Some(farm_id) {
            return Err(BreedingError::UnknownBull);
        }
        Ok(bull)
    }

    pub fn register_bull(&self, farm_id: FarmId, new: NewBull) -> Result<Bull, BreedingError> {
        let bull_id = BullId::generate();
        let command = BullCommand::Register(RegisterBull {
            farm_id,
            bull_id,
            code: new.code,
            name: new.name,
            price_per_dose: new.price_per_dose,
            initial_doses: new.initial_doses,
            occurred_at: Utc::now(),
        });
        let out = dispatch_with_retry(&self.dispatcher, self.settings, farm_id, bull_id, &command)?;
        info!(%farm_id, %bull_id, code = out.aggregate.code(), doses = out.aggregate.initial_doses(), "bull registered");
        Ok(out.aggregate)
    }

    /// Consume one dose per animal and create their insemination records.
    ///
    /// Duplicates in the animal set are impossible by construction; an empty
    /// set is a validation error. Nothing is written unless every check
    /// passes.
    pub fn record_insemination(
        &self,
        farm_id: FarmId,
        request: RecordInsemination,
    ) -> Result<Vec<InseminationRecord>, BreedingError> {
        if request.animals.is_empty() {
            return Err(BreedingError::validation("at least one animal is required"));
        }

        // Fail fast on the bull before consulting collaborators.
        self.bull(farm_id, request.bull_id)?;
        self.check_executor(farm_id, request.executor_id)?;
        for animal_id in &request.animals {
            self.check_animal(farm_id, *animal_id)?;
        }

        let entries: Vec<(InseminationId, AnimalId)> = request
            .animals
            .iter()
            .map(|animal_id| (InseminationId::new(), *animal_id))
            .collect();
        let command = BullCommand::ConsumeDoses(ConsumeDoses {
            farm_id,
            bull_id: request.bull_id,
            date: request.date,
            time: request.time,
            executor_id: request.executor_id,
            entries,
            occurred_at: Utc::now(),
        });

        let out = dispatch_with_retry(&self.dispatcher, self.settings, farm_id, request.bull_id, &command)
            .inspect_err(|e| warn!(%farm_id, bull_id = %request.bull_id, error = %e, "insemination rejected"))?;
        self.index.index_events(farm_id, &out.events);

        let records: Vec<InseminationRecord> = out
            .events
            .iter()
            .flat_map(|event| match event {
                BullEvent::DosesConsumed(e) => e.records.clone(),
                _ => Vec::new(),
            })
            .collect();

        info!(
            %farm_id,
            bull_id = %request.bull_id,
            executor = %request.executor_id,
            animals = records.len(),
            remaining = out.aggregate.remaining(),
            "inseminations recorded"
        );

        for record in &records {
            if let Err(err) = self.registry.set_breeding_date(farm_id, record.animal_id, record.date) {
                warn!(%farm_id, animal_id = %record.animal_id, error = %err, "animal registry not updated after insemination");
            }
        }

        Ok(records)
    }

    /// Tombstone an insemination and give its dose back to the bull.
    pub fn reverse_insemination(
        &self,
        farm_id: FarmId,
        insemination_id: InseminationId,
        reason: &str,
        actor: UserId,
    ) -> Result<InseminationRecord, BreedingError> {
        let bull_id = self
            .index
            .bull_of(farm_id, insemination_id)
            .ok_or(BreedingError::EventNotFound)?;

        let command = BullCommand::ReverseInsemination(ReverseInsemination {
            farm_id,
            bull_id,
            insemination_id,
            reason: reason.to_string(),
            actor,
            occurred_at: Utc::now(),
        });
        let out = dispatch_with_retry(&self.dispatcher, self.settings, farm_id, bull_id, &command)?;

        let record = out
            .aggregate
            .insemination(insemination_id)
            .cloned()
            .ok_or(BreedingError::EventNotFound)?;

        info!(%farm_id, %bull_id, %insemination_id, %actor, remaining = out.aggregate.remaining(), "insemination reversed");

        if let Err(err) = self.registry.revert_breeding(farm_id, record.animal_id, record.date) {
            warn!(%farm_id, animal_id = %record.animal_id, error = %err, "animal registry not reverted after reversal");
        }

        Ok(record)
    }

    /// Shrink stock without a breeding (expired, damaged straws).
    pub fn write_off_doses(
        &self,
        farm_id: FarmId,
        bull_id: BullId,
        quantity: u32,
        reason: &str,
        actor: UserId,
    ) -> Result<Bull, BreedingError> {
        let command = BullCommand::WriteOff(WriteOffDoses {
            farm_id,
            bull_id,
            quantity,
            reason: reason.to_string(),
            actor,
            occurred_at: Utc::now(),
        });
        let out = dispatch_with_retry(&self.dispatcher, self.settings, farm_id, bull_id, &command)?;
        info!(%farm_id, %bull_id, quantity, %actor, remaining = out.aggregate.remaining(), "doses written off");
        Ok(out.aggregate)
    }

    /// Only a bull with no doses left can be removed.
    pub fn remove_bull(&self, farm_id: FarmId, bull_id: BullId, actor: UserId) -> Result<(), BreedingError> {
        let command = BullCommand::Remove(RemoveBull {
            farm_id,
            bull_id,
            actor,
            occurred_at: Utc::now(),
        });
        dispatch_with_retry(&self.dispatcher, self.settings, farm_id, bull_id, &command)?;
        info!(%farm_id, %bull_id, %actor, "bull removed");
        Ok(())
    }

    fn check_executor(&self, farm_id: FarmId, executor_id: UserId) -> Result<(), BreedingError> {
        let entry = self
            .directory
            .lookup(farm_id, executor_id)
            .map_err(collaborator_failure)?
            .ok_or(BreedingError::UnknownExecutor)?;
        if !entry.can_execute_insemination() {
            return Err(BreedingError::IneligibleExecutor);
        }
        Ok(())
    }

    fn check_animal(&self, farm_id: FarmId, animal_id: AnimalId) -> Result<(), BreedingError> {
        match self.registry.status(farm_id, animal_id).map_err(collaborator_failure)? {
            None => Err(BreedingError::UnknownAnimal(animal_id)),
            Some(AnimalStatus::Archived) => Err(BreedingError::ArchivedAnimal(animal_id)),
            Some(_) => Ok(()),
        }
    }
}

/// Dispatch a bull command, reloading and re-deciding on version conflicts.
pub(crate) fn dispatch_with_retry<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    settings: LedgerSettings,
    farm_id: FarmId,
    bull_id: BullId,
    command: &BullCommand,
) -> Result<Dispatched<Bull>, BreedingError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = dispatcher.dispatch(
            farm_id,
            bull_id.0,
            aggregate_types::BULL,
            command.clone(),
            |_, id| Bull::empty(BullId(id)),
        );
        match result {
            Ok(out) => return Ok(out),
            Err(DispatchError::Concurrency(msg)) if attempt < max_attempts => {
                warn!(%farm_id, %bull_id, attempt, %msg, "bull stream moved on; re-validating");
                attempt += 1;
            }
            Err(err) => return Err(into_breeding_error(err)),
        }
    }
}

fn into_breeding_error(err: DispatchError<BreedingError>) -> BreedingError {
    match err {
        DispatchError::Rejected(e) => e,
        DispatchError::Concurrency(msg) => BreedingError::Conflict(msg),
        // Another farm's stream is invisible to the caller.
        DispatchError::FarmIsolation(_) => BreedingError::UnknownBull,
        other => BreedingError::Remote(other.to_string()),
    }
}

fn collaborator_failure(err: CollaboratorError) -> BreedingError {
    BreedingError::Remote(err.to_string())
}
