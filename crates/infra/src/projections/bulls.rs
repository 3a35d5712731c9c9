use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use herdbook_breeding::{BullEvent, BullId};
use herdbook_core::FarmId;
use herdbook_events::EventEnvelope;

use super::{StreamCursors, aggregate_types};
use crate::read_model::FarmStore;

/// Semen stock card for one bull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BullReadModel {
    pub bull_id: BullId,
    pub code: String,
    pub name: String,
    /// Minor currency units.
    pub price_per_dose: u64,
    pub initial_doses: u32,
    pub remaining_doses: u32,
    pub written_off: u32,
    pub active_inseminations: u32,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct BullsProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> BullsProjection<S>
where
    S: FarmStore<BullId, BullReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, farm_id: FarmId, bull_id: &BullId) -> Option<BullReadModel> {
        self.store.get(farm_id, bull_id)
    }

    /// Bulls of a farm, ordered by code.
    pub fn list(&self, farm_id: FarmId) -> Vec<BullReadModel> {
        let mut bulls = self.store.list(farm_id);
        bulls.sort_by(|a, b| a.code.cmp(&b.code));
        bulls
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> anyhow::Result<()> {
        if envelope.aggregate_type() != aggregate_types::BULL || !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: BullEvent = serde_json::from_value(envelope.payload().clone())?;
        let farm_id = envelope.farm_id();

        match event {
            BullEvent::Registered(e) => {
                self.store.upsert(
                    farm_id,
                    e.bull_id,
                    BullReadModel {
                        bull_id: e.bull_id,
                        code: e.code,
                        name: e.name,
                        price_per_dose: e.price_per_dose,
                        initial_doses: e.initial_doses,
                        remaining_doses: e.initial_doses,
                        written_off: 0,
                        active_inseminations: 0,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            BullEvent::DosesConsumed(e) => {
                let used = e.records.len() as u32;
                self.update(farm_id, e.bull_id, e.occurred_at, |m| {
                    m.remaining_doses = m.remaining_doses.saturating_sub(used);
                    m.active_inseminations += used;
                });
            }
            BullEvent::InseminationReversed(e) => {
                self.update(farm_id, e.bull_id, e.occurred_at, |m| {
                    m.remaining_doses += 1;
                    m.active_inseminations = m.active_inseminations.saturating_sub(1);
                });
            }
            BullEvent::DosesWrittenOff(e) => {
                self.update(farm_id, e.bull_id, e.occurred_at, |m| {
                    m.remaining_doses = m.remaining_doses.saturating_sub(e.quantity);
                    m.written_off += e.quantity;
                });
            }
            BullEvent::InseminationStatusChanged(_) => {}
            BullEvent::Removed(e) => {
                self.store.remove(farm_id, &e.bull_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn update(
        &self,
        farm_id: FarmId,
        bull_id: BullId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut BullReadModel),
    ) {
        if let Some(mut model) = self.store.get(farm_id, &bull_id) {
            change(&mut model);
            model.updated_at = at;
            self.store.upsert(farm_id, bull_id, model);
        }
    }
}
