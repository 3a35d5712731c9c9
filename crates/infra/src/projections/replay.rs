//! Start-up replay: rebuild process-local state from the event store.
//!
//! Read models and the insemination index live in memory and are otherwise
//! fed only by events published after the process started. Replaying every
//! committed event through the same handlers brings them back in line with
//! the store; per-stream cursors make a later live delivery of an already
//! replayed event a no-op.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use herdbook_core::{AggregateId, FarmId};
use herdbook_events::EventEnvelope;

use crate::event_store::{EventFilter, EventStore, EventStoreError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection error at {aggregate_type} {aggregate_id} #{sequence_number}: {message}")]
    Projection {
        aggregate_type: String,
        aggregate_id: AggregateId,
        sequence_number: u64,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub events: u64,
    pub streams: u64,
}

/// Feed every event matching `filter` to `apply`, in commit order.
///
/// Stops at the first handler error; state applied before it is kept.
pub fn replay<S, F>(store: &S, filter: &EventFilter, mut apply: F) -> Result<ReplaySummary, ReplayError>
where
    S: EventStore + ?Sized,
    F: FnMut(&EventEnvelope<JsonValue>) -> anyhow::Result<()>,
{
    let events = store.load_events(filter)?;
    let mut streams: HashSet<(FarmId, AggregateId)> = HashSet::new();
    let mut summary = ReplaySummary::default();

    for event in &events {
        let envelope = event.to_envelope();
        apply(&envelope).map_err(|e| ReplayError::Projection {
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id,
            sequence_number: event.sequence_number,
            message: format!("{e:#}"),
        })?;
        streams.insert(envelope.stream_key());
        summary.events += 1;
    }
    summary.streams = streams.len() as u64;

    debug!(events = summary.events, streams = summary.streams, "replay finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herdbook_core::ExpectedVersion;
    use uuid::Uuid;

    use crate::event_store::{InMemoryEventStore, UncommittedEvent};

    fn append(store: &InMemoryEventStore, farm_id: FarmId, aggregate_id: AggregateId, aggregate_type: &str) {
        store
            .append(
                vec![UncommittedEvent {
                    event_id: Uuid::now_v7(),
                    farm_id,
                    aggregate_id,
                    aggregate_type: aggregate_type.to_string(),
                    event_type: "test.happened".to_string(),
                    event_version: 1,
                    occurred_at: Utc::now(),
                    payload: serde_json::json!({}),
                }],
                ExpectedVersion::Any,
            )
            .unwrap();
    }

    #[test]
    fn replays_matching_events_in_commit_order() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        append(&store, farm_id, a, "bull");
        append(&store, farm_id, b, "bull");
        append(&store, farm_id, AggregateId::new(), "animal");
        append(&store, farm_id, a, "bull");

        let mut seen = Vec::new();
        let summary = replay(&store, &EventFilter::for_types(["bull"]), |env| {
            seen.push((env.aggregate_id(), env.sequence_number()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![(a, 1), (b, 1), (a, 2)]);
        assert_eq!(summary, ReplaySummary { events: 3, streams: 2 });
    }

    #[test]
    fn handler_failure_names_the_event() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let id = AggregateId::new();
        append(&store, farm_id, id, "bull");

        let err = replay(&store, &EventFilter::all(), |_| anyhow::bail!("bad payload")).unwrap_err();
        match err {
            ReplayError::Projection { aggregate_id, sequence_number, message, .. } => {
                assert_eq!(aggregate_id, id);
                assert_eq!(sequence_number, 1);
                assert!(message.contains("bad payload"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
