use std::collections::HashMap;
use std::sync::RwLock;

use herdbook_core::{AggregateId, ExpectedVersion, FarmId};

use super::query::EventFilter;
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    farm_id: FarmId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Streams {
    by_key: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Every committed event, in commit order.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store for tests and single-node dev runs.
///
/// The version check and the push happen under one write lock, so two
/// appends expecting the same version can never both land.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&events)?;

        let key = StreamKey {
            farm_id: events[0].farm_id,
            aggregate_id: events[0].aggregate_id,
        };
        let aggregate_type = events[0].aggregate_type.clone();

        let mut guard = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let streams = &mut *guard;
        let stream = streams.by_key.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                farm_id: e.farm_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            streams.log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        farm_id: FarmId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            farm_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(streams.by_key.get(&key).cloned().unwrap_or_default())
    }

    fn load_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(streams.log.iter().filter(|e| filter.matches(e)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(farm_id: FarmId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            farm_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn sequence_numbers_continue_per_stream() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(farm_id, id, "bull"), event(farm_id, id, "bull")], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let second = store
            .append(vec![event(farm_id, id, "bull")], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(farm_id, id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(farm_id, id, "bull")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(farm_id, id, "bull")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(farm_id, id).unwrap().len(), 1);
    }

    #[test]
    fn streams_are_farm_scoped() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(farm_id, id, "bull")], ExpectedVersion::Any)
            .unwrap();

        assert!(store.load_stream(FarmId::new(), id).unwrap().is_empty());

        let mixed = vec![event(farm_id, id, "bull"), event(FarmId::new(), id, "bull")];
        let err = store.append(mixed, ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, EventStoreError::FarmIsolation(_)));
    }

    #[test]
    fn cross_stream_reads_keep_commit_order() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let user = AggregateId::new();
        let bull = AggregateId::new();
        let animal = AggregateId::new();

        store.append(vec![event(farm_id, user, "user")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(farm_id, bull, "bull")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(farm_id, animal, "animal")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(farm_id, user, "user")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(FarmId::new(), bull, "bull")], ExpectedVersion::Any).unwrap();

        let read = store.load_events(&EventFilter::for_types(["user", "bull"])).unwrap();
        let order: Vec<_> = read.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(order, vec![(user, 1), (bull, 1), (user, 2), (bull, 1)]);

        let one_farm = store.load_events(&EventFilter::all().in_farm(farm_id)).unwrap();
        assert_eq!(one_farm.len(), 4);
    }

    #[test]
    fn aggregate_type_is_fixed_by_first_append() {
        let store = InMemoryEventStore::new();
        let farm_id = FarmId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(farm_id, id, "bull")], ExpectedVersion::Any)
            .unwrap();

        let err = store
            .append(vec![event(farm_id, id, "animal")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
