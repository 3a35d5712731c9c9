//! End-to-end tests of the breeding pipeline.
//!
//! Ledger → EventStore → EventBus → ProjectionWorker → ReadModels, with the
//! real user directory and animal registry behind the ledger.
//!
//! Verifies:
//! - The dose equation holds after every mix of operations
//! - Concurrent submissions never over-draw a bull
//! - Read models follow reversals, status changes and user deletion
//! - A restarted process rebuilds its memory from the store

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    use herdbook_auth::Role;
    use herdbook_breeding::{BreedingError, BullId, InseminationStatus};
    use herdbook_core::{AggregateRoot, FarmId, UserId};
    use herdbook_events::{EventEnvelope, InMemoryEventBus};
    use herdbook_herd::{AnimalId, AnimalStatus};

    use crate::collaborators::{AnimalRegistry, UserDirectory};
    use crate::command_dispatcher::CommandDispatcher;
    use crate::directory::UserAccounts;
    use crate::event_store::{EventFilter, InMemoryEventStore};
    use crate::ledger::{DoseLedger, LedgerSettings, NewBull, RecordInsemination};
    use crate::pregnancy::PregnancyChecks;
    use crate::projections::{DELETED_USER_PLACEHOLDER, ReadModels, aggregate_types, replay};
    use crate::registry::{HerdRegistry, NewAnimal};
    use crate::workers::{ProjectionWorker, WorkerHandle};

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Farm {
        store: Store,
        farm_id: FarmId,
        admin: UserId,
        accounts: UserAccounts<Store, Bus>,
        herd: HerdRegistry<Store, Bus>,
        ledger: DoseLedger<Store, Bus>,
        checks: PregnancyChecks<Store, Bus>,
        read_models: ReadModels,
        worker: Option<WorkerHandle>,
    }

    impl Drop for Farm {
        fn drop(&mut self) {
            if let Some(worker) = self.worker.take() {
                worker.shutdown();
            }
        }
    }

    fn setup(settings: LedgerSettings) -> Farm {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let mut farm = wire(store, FarmId::new(), UserId::new(), settings);
        farm.admin = *farm
            .accounts
            .create_user(farm.farm_id, "Администратор", Role::Admin)
            .unwrap()
            .id();
        farm
    }

    /// A fresh process over an existing store: new bus, empty memory, then
    /// the same start-up replay the server does.
    fn wire(store: Store, farm_id: FarmId, admin: UserId, settings: LedgerSettings) -> Farm {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

        let read_models = ReadModels::in_memory();
        let sink = read_models.clone();
        let worker = ProjectionWorker::spawn("read-models", &bus, None, move |env: EventEnvelope<JsonValue>| {
            sink.apply_envelope(&env)
        })
        .unwrap();

        let accounts = UserAccounts::new(dispatcher.clone());
        let herd = HerdRegistry::new(dispatcher.clone());
        let directory: Arc<dyn UserDirectory> = Arc::new(accounts.clone());
        let registry: Arc<dyn AnimalRegistry> = Arc::new(herd.clone());
        let ledger = DoseLedger::new(dispatcher.clone(), directory, registry, settings);
        let checks = PregnancyChecks::new(dispatcher, ledger.index().clone(), settings);

        let index = ledger.index().clone();
        replay(&store, &EventFilter::for_types(aggregate_types::ALL), |env| {
            read_models.apply_envelope(env)?;
            index.apply_envelope(env)
        })
        .unwrap();

        Farm {
            store,
            farm_id,
            admin,
            accounts,
            herd,
            ledger,
            checks,
            read_models,
            worker: Some(worker),
        }
    }

    impl Farm {
        fn user(&self, name: &str, role: Role) -> UserId {
            *self.accounts.create_user(self.farm_id, name, role).unwrap().id()
        }

        fn cow(&self, tag: &str) -> AnimalId {
            let animal = self
                .herd
                .register_animal(
                    self.farm_id,
                    NewAnimal {
                        ear_tag: tag.to_string(),
                        ..NewAnimal::default()
                    },
                )
                .unwrap();
            *animal.id()
        }

        fn bull(&self, doses: u32) -> BullId {
            let bull = self
                .ledger
                .register_bull(
                    self.farm_id,
                    NewBull {
                        code: "HOL-204".to_string(),
                        name: "Тайфун".to_string(),
                        price_per_dose: 3_000,
                        initial_doses: doses,
                    },
                )
                .unwrap();
            *bull.id()
        }

        fn record(
            &self,
            bull_id: BullId,
            executor_id: UserId,
            animals: &[AnimalId],
            day: u32,
        ) -> Result<Vec<herdbook_breeding::InseminationRecord>, BreedingError> {
            self.ledger.record_insemination(
                self.farm_id,
                RecordInsemination {
                    bull_id,
                    animals: animals.iter().copied().collect::<BTreeSet<_>>(),
                    executor_id,
                    date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                    time: None,
                },
            )
        }
    }

    /// Poll until the asynchronous projections catch up.
    fn eventually(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("read models did not catch up in time");
    }

    #[test]
    fn doses_are_consumed_reversed_and_written_off() {
        let farm = setup(LedgerSettings::default());
        let executor = farm.user("Пётр", Role::Inseminator);
        let a1 = farm.cow("RU-001");
        let a2 = farm.cow("RU-002");
        let a3 = farm.cow("RU-003");
        let bull_id = farm.bull(2);

        let records = farm.record(bull_id, executor, &[a1, a2], 1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(farm.ledger.bull(farm.farm_id, bull_id).unwrap().remaining(), 0);

        let err = farm.record(bull_id, executor, &[a3], 2).unwrap_err();
        assert!(matches!(err, BreedingError::InsufficientDoses { requested: 1, remaining: 0 }));

        farm.ledger
            .reverse_insemination(farm.farm_id, records[0].id, "ошибка ввода", farm.admin)
            .unwrap();
        let bull = farm.ledger.bull(farm.farm_id, bull_id).unwrap();
        assert_eq!(bull.remaining(), 1);
        assert!(bull.insemination(records[1].id).unwrap().is_active());

        let err = farm
            .ledger
            .write_off_doses(farm.farm_id, bull_id, 5, "истек срок", farm.admin)
            .unwrap_err();
        assert_eq!(err, BreedingError::ExceedsStock { requested: 5, remaining: 1 });

        let rm = farm.read_models.clone();
        let farm_id = farm.farm_id;
        eventually(|| {
            rm.bulls
                .get(farm_id, &bull_id)
                .is_some_and(|b| b.remaining_doses == 1 && b.active_inseminations == 1)
        });
        eventually(|| rm.inseminations.list(farm_id, false).len() == 1);
        assert_eq!(rm.inseminations.list(farm_id, true).len(), 2);

        let reversed_cow = records[0].animal_id;
        let kept_cow = records[1].animal_id;
        eventually(|| {
            rm.animals.get(farm_id, &reversed_cow).is_some_and(|a| a.status == AnimalStatus::Active)
                && rm.animals.get(farm_id, &kept_cow).is_some_and(|a| a.status == AnimalStatus::Inseminated)
        });
    }

    #[test]
    fn concurrent_submissions_never_over_draw() {
        let farm = Arc::new(setup(LedgerSettings { max_attempts: 64 }));
        let executor = farm.user("Анна", Role::Zootechnician);
        let bull_id = farm.bull(5);
        let cows: Vec<AnimalId> = (0..10).map(|i| farm.cow(&format!("RU-1{i:02}"))).collect();

        let handles: Vec<_> = cows
            .into_iter()
            .map(|cow| {
                let farm = farm.clone();
                std::thread::spawn(move || farm.record(bull_id, executor, &[cow], 3))
            })
            .collect();

        let mut recorded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(records) => recorded += records.len() as u32,
                Err(BreedingError::InsufficientDoses { .. }) | Err(BreedingError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let bull = farm.ledger.bull(farm.farm_id, bull_id).unwrap();
        assert!(recorded <= 5);
        assert_eq!(bull.remaining(), 5 - recorded);
        assert_eq!(bull.active_inseminations(), recorded);
        assert!(bull.reconciles());
    }

    #[test]
    fn deactivated_executor_is_refused_and_deleted_one_detached() {
        let farm = setup(LedgerSettings::default());
        let executor = farm.user("Мария", Role::Vet);
        let cow = farm.cow("RU-200");
        let other = farm.cow("RU-201");
        let bull_id = farm.bull(4);

        let records = farm.record(bull_id, executor, &[cow], 4).unwrap();

        farm.accounts.deactivate(farm.farm_id, executor, farm.admin).unwrap();
        assert_eq!(
            farm.record(bull_id, executor, &[other], 5).unwrap_err(),
            BreedingError::IneligibleExecutor
        );

        farm.accounts.delete(farm.farm_id, executor, farm.admin).unwrap();
        assert_eq!(
            farm.record(bull_id, executor, &[other], 5).unwrap_err(),
            BreedingError::UnknownExecutor
        );

        let rm = farm.read_models.clone();
        let farm_id = farm.farm_id;
        let id = records[0].id;
        eventually(|| {
            rm.inseminations
                .get(farm_id, &id)
                .is_some_and(|r| r.executor_id.is_none() && r.executor_name == DELETED_USER_PLACEHOLDER)
        });
        assert!(rm.users.get(farm_id, &executor).is_none());
        assert_eq!(farm.ledger.bull(farm_id, bull_id).unwrap().remaining(), 3);
    }

    #[test]
    fn pregnancy_check_reaches_the_journal() {
        let farm = setup(LedgerSettings::default());
        let vet = farm.user("Ветврач", Role::Vet);
        let cow = farm.cow("RU-300");
        let bull_id = farm.bull(1);
        let records = farm.record(bull_id, vet, &[cow], 6).unwrap();

        farm.checks
            .set_status(farm.farm_id, records[0].id, InseminationStatus::Pregnant, vet)
            .unwrap();

        let rm = farm.read_models.clone();
        let farm_id = farm.farm_id;
        let id = records[0].id;
        eventually(|| {
            rm.inseminations
                .get(farm_id, &id)
                .is_some_and(|r| r.status == InseminationStatus::Pregnant)
        });
        assert_eq!(farm.ledger.bull(farm_id, bull_id).unwrap().remaining(), 0);
    }

    #[test]
    fn farms_do_not_see_each_other() {
        let farm = setup(LedgerSettings::default());
        let executor = farm.user("Иван", Role::Inseminator);
        let cow = farm.cow("RU-400");
        let bull_id = farm.bull(3);

        let stranger = FarmId::new();
        let err = farm
            .ledger
            .record_insemination(
                stranger,
                RecordInsemination {
                    bull_id,
                    animals: [cow].into_iter().collect(),
                    executor_id: executor,
                    date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                    time: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, BreedingError::UnknownBull);
        assert!(farm.read_models.bulls.list(stranger).is_empty());
    }

    #[test]
    fn restart_restores_reversal_lookup_and_read_models() {
        let before = setup(LedgerSettings::default());
        let executor = before.user("Пётр", Role::Inseminator);
        let cow = before.cow("RU-500");
        let other = before.cow("RU-501");
        let bull_id = before.bull(3);
        let records = before.record(bull_id, executor, &[cow, other], 8).unwrap();

        let after = wire(before.store.clone(), before.farm_id, before.admin, LedgerSettings::default());
        drop(before);
        let farm_id = after.farm_id;

        // Memory of the new process was filled by replay, not by live events.
        let bull = after.read_models.bulls.get(farm_id, &bull_id).unwrap();
        assert_eq!(bull.remaining_doses, 1);
        assert_eq!(after.read_models.inseminations.list(farm_id, false).len(), 2);
        assert_eq!(
            after.read_models.inseminations.get(farm_id, &records[0].id).unwrap().executor_name,
            "Пётр"
        );
        assert_eq!(after.ledger.index().bull_of(farm_id, records[0].id), Some(bull_id));

        let reversed = after
            .ledger
            .reverse_insemination(farm_id, records[0].id, "ошибка ввода", after.admin)
            .unwrap();
        assert!(!reversed.is_active());
        assert_eq!(after.ledger.bull(farm_id, bull_id).unwrap().remaining(), 2);

        let rm = after.read_models.clone();
        eventually(|| {
            rm.bulls
                .get(farm_id, &bull_id)
                .is_some_and(|b| b.remaining_doses == 2 && b.active_inseminations == 1)
        });
        eventually(|| rm.inseminations.list(farm_id, false).len() == 1);
        assert_eq!(rm.inseminations.list(farm_id, true).len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Record(usize),
        Reverse(usize),
        WriteOff(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..=3).prop_map(Op::Record),
            (0usize..8).prop_map(Op::Reverse),
            (0u32..=4).prop_map(Op::WriteOff),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn dose_equation_holds_for_any_history(initial in 0u32..8, ops in prop::collection::vec(op(), 1..12)) {
            let farm = setup(LedgerSettings::default());
            let executor = farm.user("Осеменатор", Role::Inseminator);
            let bull_id = farm.bull(initial);

            let mut recorded = Vec::new();
            let mut written_off = 0u32;
            let mut cow_no = 0;

            for op in ops {
                let before = farm.ledger.bull(farm.farm_id, bull_id).unwrap().remaining();
                match op {
                    Op::Record(n) => {
                        let cows: Vec<AnimalId> = (0..n)
                            .map(|_| {
                                cow_no += 1;
                                farm.cow(&format!("P-{cow_no}"))
                            })
                            .collect();
                        match farm.record(bull_id, executor, &cows, 7) {
                            Ok(records) => recorded.extend(records.into_iter().map(|r| r.id)),
                            Err(e) => {
                                let insufficient = matches!(e, BreedingError::InsufficientDoses { .. });
                                prop_assert!(insufficient, "unexpected rejection: {}", e);
                                prop_assert!(n as u32 > before);
                            }
                        }
                    }
                    Op::Reverse(i) => {
                        if let Some(id) = recorded.get(i).copied() {
                            let _ = farm.ledger.reverse_insemination(farm.farm_id, id, "ошибка ввода", farm.admin);
                        }
                    }
                    Op::WriteOff(q) => {
                        if farm.ledger.write_off_doses(farm.farm_id, bull_id, q, "брак", farm.admin).is_ok() {
                            written_off += q;
                        }
                    }
                }

                let bull = farm.ledger.bull(farm.farm_id, bull_id).unwrap();
                prop_assert!(bull.reconciles());
                prop_assert_eq!(bull.written_off(), written_off);
                prop_assert_eq!(bull.remaining(), initial - bull.active_inseminations() - written_off);
            }
        }
    }
}
