//! Append-only event store boundary.
//!
//! One stream per aggregate instance, keyed by `(farm_id, aggregate_id)`.
//! Appends carry an [`ExpectedVersion`](herdbook_core::ExpectedVersion) so
//! concurrent writers to the same bull never both succeed.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use query::EventFilter;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
