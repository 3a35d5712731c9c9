//! Farm-isolated read model storage.

pub mod farm_store;

pub use farm_store::{FarmStore, InMemoryFarmStore};
