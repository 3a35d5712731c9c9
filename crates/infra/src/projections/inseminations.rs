//! Insemination journal read model.
//!
//! Denormalizes the executor's display name and the bull code so the journal
//! can be listed without joins. When a user is hard-deleted, their records
//! stay but are detached: the executor id is cleared and the name replaced by
//! [`DELETED_USER_PLACEHOLDER`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use herdbook_auth::UserEvent;
use herdbook_breeding::{BullEvent, BullId, InseminationId, InseminationStatus, Lifecycle};
use herdbook_core::{FarmId, UserId};
use herdbook_events::EventEnvelope;
use herdbook_herd::AnimalId;

use super::{StreamCursors, aggregate_types};
use crate::read_model::{FarmStore, InMemoryFarmStore};

pub const DELETED_USER_PLACEHOLDER: &str = "(удалённый пользователь)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InseminationReadModel {
    pub insemination_id: InseminationId,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub animal_id: AnimalId,
    pub bull_id: BullId,
    pub bull_code: String,
    pub executor_id: Option<UserId>,
    pub executor_name: String,
    pub status: InseminationStatus,
    pub lifecycle: Lifecycle,
    pub recorded_at: DateTime<Utc>,
}

impl InseminationReadModel {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

pub struct InseminationsProjection<S> {
    store: S,
    executor_names: InMemoryFarmStore<UserId, String>,
    bull_codes: InMemoryFarmStore<BullId, String>,
    cursors: StreamCursors,
}

impl<S> InseminationsProjection<S>
where
    S: FarmStore<InseminationId, InseminationReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            executor_names: InMemoryFarmStore::new(),
            bull_codes: InMemoryFarmStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, farm_id: FarmId, id: &InseminationId) -> Option<InseminationReadModel> {
        self.store.get(farm_id, id)
    }

    /// Journal, newest first. Tombstoned records are included only on request.
    pub fn list(&self, farm_id: FarmId, include_deleted: bool) -> Vec<InseminationReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(farm_id)
            .into_iter()
            .filter(|r| include_deleted || r.is_active())
            .collect();
        rows.sort_by(|a, b| {
            (b.date, b.time, b.insemination_id).cmp(&(a.date, a.time, a.insemination_id))
        });
        rows
    }

    pub fn for_animal(&self, farm_id: FarmId, animal_id: AnimalId) -> Vec<InseminationReadModel> {
        self.list(farm_id, true)
            .into_iter()
            .filter(|r| r.animal_id == animal_id)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> anyhow::Result<()> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != aggregate_types::BULL && aggregate_type != aggregate_types::USER {
            return Ok(());
        }
        if !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let farm_id = envelope.farm_id();
        if aggregate_type == aggregate_types::USER {
            let event: UserEvent = serde_json::from_value(envelope.payload().clone())?;
            self.apply_user_event(farm_id, event);
        } else {
            let event: BullEvent = serde_json::from_value(envelope.payload().clone())?;
            self.apply_bull_event(farm_id, event);
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn apply_user_event(&self, farm_id: FarmId, event: UserEvent) {
        match event {
            UserEvent::Created(e) => {
                self.executor_names.upsert(farm_id, e.user_id, e.display_name);
            }
            UserEvent::Deleted(e) => {
                self.executor_names.remove(farm_id, &e.user_id);
                for mut row in self.store.list(farm_id) {
                    if row.executor_id == Some(e.user_id) {
                        row.executor_id = None;
                        row.executor_name = DELETED_USER_PLACEHOLDER.to_string();
                        self.store.upsert(farm_id, row.insemination_id, row);
                    }
                }
            }
            UserEvent::RoleChanged(_) | UserEvent::Deactivated(_) | UserEvent::Activated(_) => {}
        }
    }

    fn apply_bull_event(&self, farm_id: FarmId, event: BullEvent) {
        match event {
            BullEvent::Registered(e) => {
                self.bull_codes.upsert(farm_id, e.bull_id, e.code);
            }
            BullEvent::DosesConsumed(e) => {
                let bull_code = self.bull_codes.get(farm_id, &e.bull_id).unwrap_or_default();
                for record in e.records {
                    let executor_name = self
                        .executor_names
                        .get(farm_id, &record.executor_id)
                        .unwrap_or_else(|| record.executor_id.to_string());
                    self.store.upsert(
                        farm_id,
                        record.id,
                        InseminationReadModel {
                            insemination_id: record.id,
                            date: record.date,
                            time: record.time,
                            animal_id: record.animal_id,
                            bull_id: record.bull_id,
                            bull_code: bull_code.clone(),
                            executor_id: Some(record.executor_id),
                            executor_name,
                            status: record.status,
                            lifecycle: record.lifecycle,
                            recorded_at: e.occurred_at,
                        },
                    );
                }
            }
            BullEvent::InseminationReversed(e) => {
                if let Some(mut row) = self.store.get(farm_id, &e.insemination_id) {
                    row.lifecycle = Lifecycle::Deleted {
                        reason: e.reason,
                        actor: e.actor,
                        at: e.occurred_at,
                    };
                    self.store.upsert(farm_id, e.insemination_id, row);
                }
            }
            BullEvent::InseminationStatusChanged(e) => {
                if let Some(mut row) = self.store.get(farm_id, &e.insemination_id) {
                    row.status = e.to;
                    self.store.upsert(farm_id, e.insemination_id, row);
                }
            }
            BullEvent::DosesWrittenOff(_) | BullEvent::Removed(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herdbook_auth::{Role, UserCreated, UserDeleted};
    use herdbook_breeding::{BullRegistered, DosesConsumed, InseminationRecord};
    use herdbook_core::AggregateId;
    use uuid::Uuid;

    use crate::read_model::InMemoryFarmStore;

    fn env(farm_id: FarmId, aggregate_id: AggregateId, ty: &str, seq: u64, payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), farm_id, aggregate_id, ty, seq, payload)
    }

    #[test]
    fn deleted_executor_is_detached_but_records_remain() {
        let projection = InseminationsProjection::new(InMemoryFarmStore::new());
        let farm_id = FarmId::new();
        let user_id = UserId::new();
        let bull_id = BullId::generate();
        let now = Utc::now();

        let created = UserEvent::Created(UserCreated {
            farm_id,
            user_id,
            display_name: "Пётр Осеменатор".to_string(),
            role: Role::Inseminator,
            occurred_at: now,
        });
        projection
            .apply_envelope(&env(farm_id, user_id.into(), aggregate_types::USER, 1, serde_json::to_value(&created).unwrap()))
            .unwrap();

        let registered = BullEvent::Registered(BullRegistered {
            farm_id,
            bull_id,
            code: "HOL-1".to_string(),
            name: "Буян".to_string(),
            price_per_dose: 100,
            initial_doses: 3,
            occurred_at: now,
        });
        projection
            .apply_envelope(&env(farm_id, bull_id.0, aggregate_types::BULL, 1, serde_json::to_value(&registered).unwrap()))
            .unwrap();

        let record = InseminationRecord {
            id: InseminationId::new(),
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            time: None,
            animal_id: AnimalId::generate(),
            bull_id,
            executor_id: user_id,
            status: InseminationStatus::Inseminated,
            lifecycle: Lifecycle::Active,
        };
        let consumed = BullEvent::DosesConsumed(DosesConsumed {
            farm_id,
            bull_id,
            records: vec![record.clone()],
            occurred_at: now,
        });
        projection
            .apply_envelope(&env(farm_id, bull_id.0, aggregate_types::BULL, 2, serde_json::to_value(&consumed).unwrap()))
            .unwrap();

        let row = projection.get(farm_id, &record.id).unwrap();
        assert_eq!(row.executor_name, "Пётр Осеменатор");
        assert_eq!(row.bull_code, "HOL-1");

        let deleted = UserEvent::Deleted(UserDeleted {
            farm_id,
            user_id,
            deleted_by: UserId::new(),
            occurred_at: now,
        });
        projection
            .apply_envelope(&env(farm_id, user_id.into(), aggregate_types::USER, 2, serde_json::to_value(&deleted).unwrap()))
            .unwrap();

        let row = projection.get(farm_id, &record.id).unwrap();
        assert_eq!(row.executor_id, None);
        assert_eq!(row.executor_name, DELETED_USER_PLACEHOLDER);
        assert_eq!(projection.list(farm_id, false).len(), 1);
    }
}
