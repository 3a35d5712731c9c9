//! Event primitives: the `Event` contract, farm-scoped envelopes and the
//! publish/subscribe bus that fans committed events out to read models.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod farm;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use farm::FarmScoped;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
