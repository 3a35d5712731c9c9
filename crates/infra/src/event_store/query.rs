//! Cross-stream reads, used to rebuild process-local state at start-up.

use serde::{Deserialize, Serialize};

use herdbook_core::FarmId;

use super::StoredEvent;

/// Which events a cross-stream read returns. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub farm_id: Option<FarmId>,
    pub aggregate_types: Vec<String>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_types<I, T>(aggregate_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            farm_id: None,
            aggregate_types: aggregate_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn in_farm(mut self, farm_id: FarmId) -> Self {
        self.farm_id = Some(farm_id);
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        if self.farm_id.is_some_and(|f| f != event.farm_id) {
            return false;
        }
        self.aggregate_types.is_empty() || self.aggregate_types.iter().any(|t| *t == event.aggregate_type)
    }
}
