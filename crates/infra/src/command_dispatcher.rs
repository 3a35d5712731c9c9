//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (farm-scoped) and check it
//!   ↓
//! 2. Rehydrate the aggregate
//!   ↓
//! 3. Handle the command (pure decision)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Nothing is published unless the append succeeded, and nothing is appended
//! if the aggregate rejected the command.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use herdbook_core::{Aggregate, AggregateId, Classify, ErrorKind, ExpectedVersion, FarmId};
use herdbook_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Failure of one dispatch, generic over the aggregate's rejection type.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The aggregate refused the command.
    #[error("{0}")]
    Rejected(E),

    /// Another writer appended to the stream first.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("farm isolation violation: {0}")]
    FarmIsolation(String),

    /// History could not be read back into the aggregate's event type.
    #[error("stored event could not be decoded: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Events are committed but did not reach the bus.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl<E> From<EventStoreError> for DispatchError<E> {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::FarmIsolation(msg) => DispatchError::FarmIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl<E: Classify> Classify for DispatchError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Rejected(e) => e.kind(),
            DispatchError::Concurrency(_) => ErrorKind::Conflict,
            DispatchError::FarmIsolation(_) => ErrorKind::Authorization,
            DispatchError::Deserialize(_) | DispatchError::Publish(_) => ErrorKind::Remote,
            DispatchError::Store(e) => e.kind(),
        }
    }
}

/// What a dispatch decided and committed.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the new events were applied.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine over an [`EventStore`] and an [`EventBus`].
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without handling anything.
    pub fn load<A>(
        &self,
        farm_id: FarmId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(FarmId, AggregateId) -> A,
    ) -> Result<A, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(farm_id, aggregate_id)?;
        validate_loaded_stream(farm_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(farm_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Run `command` against the aggregate's current state and commit the
    /// outcome. A version conflict surfaces as [`DispatchError::Concurrency`];
    /// the caller decides whether to retry.
    pub fn dispatch<A>(
        &self,
        farm_id: FarmId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(FarmId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: herdbook_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(farm_id, aggregate_id)?;
        validate_loaded_stream(farm_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(farm_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::Rejected)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events: vec![],
                committed: vec![],
            });
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    farm_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream<E>(
    farm_id: FarmId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError<E>> {
    // Re-checked here even though the store filters by farm.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.farm_id != farm_id {
            return Err(DispatchError::FarmIsolation(format!(
                "loaded stream contains wrong farm_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::FarmIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError<A::Error>>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
