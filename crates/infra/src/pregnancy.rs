//! Pregnancy checks: the veterinary workflow that classifies inseminations.
//!
//! Classification is orthogonal to the dose ledger. It shares the bull's
//! stream (and so its optimistic concurrency) but never changes stock.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use herdbook_breeding::{
    BreedingError, BullCommand, InseminationId, InseminationRecord, InseminationStatus,
    SetInseminationStatus,
};
use herdbook_core::{FarmId, UserId};
use herdbook_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::ledger::{InseminationIndex, LedgerSettings, dispatch_with_retry};

pub struct PregnancyChecks<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    index: InseminationIndex,
    settings: LedgerSettings,
}

impl<S, B> PregnancyChecks<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, index: InseminationIndex, settings: LedgerSettings) -> Self {
        Self {
            dispatcher,
            index,
            settings,
        }
    }

    /// Record the outcome of a check. Setting the status a record already
    /// has is a no-op; tombstoned records cannot be classified.
    pub fn set_status(
        &self,
        farm_id: FarmId,
        insemination_id: InseminationId,
        status: InseminationStatus,
        actor: UserId,
    ) -> Result<InseminationRecord, BreedingError> {
        let bull_id = self
            .index
            .bull_of(farm_id, insemination_id)
            .ok_or(BreedingError::EventNotFound)?;

        let command = BullCommand::SetInseminationStatus(SetInseminationStatus {
            farm_id,
            bull_id,
            insemination_id,
            status,
            actor,
            occurred_at: Utc::now(),
        });
        let out = dispatch_with_retry(&self.dispatcher, self.settings, farm_id, bull_id, &command)?;

        if !out.events.is_empty() {
            info!(%farm_id, %insemination_id, status = status.label(), %actor, "insemination status changed");
        }

        out.aggregate
            .insemination(insemination_id)
            .cloned()
            .ok_or(BreedingError::EventNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use herdbook_auth::Role;
    use herdbook_breeding::BullId;
    use herdbook_events::InMemoryEventBus;
    use herdbook_herd::AnimalId;

    use crate::collaborators::{AnimalRegistry, UserDirectory};
    use crate::directory::UserAccounts;
    use crate::event_store::InMemoryEventStore;
    use crate::ledger::{DoseLedger, NewBull, RecordInsemination};
    use crate::registry::{HerdRegistry, NewAnimal};

    #[test]
    fn status_changes_never_touch_stock() {
        let dispatcher = Arc::new(CommandDispatcher::new(
            InMemoryEventStore::new(),
            InMemoryEventBus::<EventEnvelope<JsonValue>>::new(),
        ));
        let accounts = UserAccounts::new(dispatcher.clone());
        let herd = HerdRegistry::new(dispatcher.clone());
        let directory: Arc<dyn UserDirectory> = Arc::new(accounts.clone());
        let registry: Arc<dyn AnimalRegistry> = Arc::new(herd.clone());
        let ledger = DoseLedger::new(dispatcher.clone(), directory, registry, LedgerSettings::default());
        let checks = PregnancyChecks::new(dispatcher, ledger.index().clone(), ledger.settings());

        let farm_id = FarmId::new();
        let vet = accounts.create_user(farm_id, "Ветврач", Role::Vet).unwrap();
        let vet_id = *herdbook_core::AggregateRoot::id(&vet);
        let cow = herd
            .register_animal(
                farm_id,
                NewAnimal {
                    ear_tag: "RU-77".to_string(),
                    ..NewAnimal::default()
                },
            )
            .unwrap();
        let cow_id: AnimalId = *herdbook_core::AggregateRoot::id(&cow);
        let bull = ledger
            .register_bull(
                farm_id,
                NewBull {
                    code: "JER-3".to_string(),
                    name: "Орлик".to_string(),
                    price_per_dose: 900,
                    initial_doses: 4,
                },
            )
            .unwrap();
        let bull_id: BullId = *herdbook_core::AggregateRoot::id(&bull);

        let records = ledger
            .record_insemination(
                farm_id,
                RecordInsemination {
                    bull_id,
                    animals: [cow_id].into_iter().collect(),
                    executor_id: vet_id,
                    date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                    time: None,
                },
            )
            .unwrap();

        let record = checks
            .set_status(farm_id, records[0].id, InseminationStatus::Pregnant, vet_id)
            .unwrap();
        assert_eq!(record.status, InseminationStatus::Pregnant);
        assert_eq!(ledger.bull(farm_id, bull_id).unwrap().remaining(), 3);

        ledger
            .reverse_insemination(farm_id, records[0].id, "ошибка ввода", vet_id)
            .unwrap();
        let err = checks
            .set_status(farm_id, records[0].id, InseminationStatus::Open, vet_id)
            .unwrap_err();
        assert_eq!(err, BreedingError::AlreadyDeleted);
    }
}
