use herdbook_core::FarmId;

use crate::EventEnvelope;

/// Messages that belong to exactly one farm.
///
/// Subscribers use this to drop anything outside the farm they serve.
pub trait FarmScoped {
    fn farm_id(&self) -> FarmId;
}

impl<E> FarmScoped for EventEnvelope<E> {
    fn farm_id(&self) -> FarmId {
        EventEnvelope::farm_id(self)
    }
}
