use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use herdbook_core::FarmId;
use herdbook_events::EventEnvelope;
use herdbook_herd::{AnimalEvent, AnimalId, AnimalStatus};

use super::{StreamCursors, aggregate_types};
use crate::read_model::FarmStore;

/// Animal card as listed on the herd screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalReadModel {
    pub animal_id: AnimalId,
    pub ear_tag: String,
    pub name: Option<String>,
    pub breed: Option<String>,
    pub status: AnimalStatus,
    pub breeding_dates: Vec<NaiveDate>,
    pub last_breeding_date: Option<NaiveDate>,
    pub archive_reason: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnimalReadModel {
    fn refresh_status(&mut self) {
        self.last_breeding_date = self.breeding_dates.iter().max().copied();
        if self.archive_reason.is_some() {
            self.status = AnimalStatus::Archived;
        } else if self.breeding_dates.is_empty() {
            self.status = AnimalStatus::Active;
        } else {
            self.status = AnimalStatus::Inseminated;
        }
    }
}

pub struct AnimalsProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> AnimalsProjection<S>
where
    S: FarmStore<AnimalId, AnimalReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, farm_id: FarmId, animal_id: &AnimalId) -> Option<AnimalReadModel> {
        self.store.get(farm_id, animal_id)
    }

    /// Animals of a farm, ordered by ear tag.
    pub fn list(&self, farm_id: FarmId) -> Vec<AnimalReadModel> {
        let mut animals = self.store.list(farm_id);
        animals.sort_by(|a, b| a.ear_tag.cmp(&b.ear_tag));
        animals
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> anyhow::Result<()> {
        if envelope.aggregate_type() != aggregate_types::ANIMAL || !self.cursors.is_next(envelope)? {
            return Ok(());
        }

        let event: AnimalEvent = serde_json::from_value(envelope.payload().clone())?;
        let farm_id = envelope.farm_id();

        match event {
            AnimalEvent::Registered(e) => {
                self.store.upsert(
                    farm_id,
                    e.animal_id,
                    AnimalReadModel {
                        animal_id: e.animal_id,
                        ear_tag: e.ear_tag,
                        name: e.name,
                        breed: e.breed,
                        status: AnimalStatus::Active,
                        breeding_dates: vec![],
                        last_breeding_date: None,
                        archive_reason: None,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            AnimalEvent::BreedingRecorded(e) => {
                self.update(farm_id, e.animal_id, e.occurred_at, |m| m.breeding_dates.push(e.date));
            }
            AnimalEvent::BreedingReverted(e) => {
                self.update(farm_id, e.animal_id, e.occurred_at, |m| {
                    if let Some(pos) = m.breeding_dates.iter().rposition(|d| *d == e.date) {
                        m.breeding_dates.remove(pos);
                    }
                });
            }
            AnimalEvent::Archived(e) => {
                self.update(farm_id, e.animal_id, e.occurred_at, |m| {
                    m.archive_reason = Some(e.reason.clone())
                });
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn update(
        &self,
        farm_id: FarmId,
        animal_id: AnimalId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut AnimalReadModel),
    ) {
        if let Some(mut model) = self.store.get(farm_id, &animal_id) {
            change(&mut model);
            model.refresh_status();
            model.updated_at = at;
            self.store.upsert(farm_id, animal_id, model);
        }
    }
}
