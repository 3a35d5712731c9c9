use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herdbook_core::{AggregateId, FarmId};

/// A committed event as the bus carries it to one farm's read models.
///
/// A stream is identified by farm and aggregate together, and
/// `sequence_number` counts from 1 without gaps inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    farm_id: FarmId,
    aggregate_id: AggregateId,
    /// `herd.animal`, `breeding.bull` or `auth.user`.
    aggregate_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        farm_id: FarmId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            farm_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn farm_id(&self) -> FarmId {
        self.farm_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Key of the stream this event belongs to.
    pub fn stream_key(&self) -> (FarmId, AggregateId) {
        (self.farm_id, self.aggregate_id)
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
