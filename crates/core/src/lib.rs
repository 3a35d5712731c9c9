//! `herdbook-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{Classify, DomainError, DomainResult, ErrorKind};
pub use id::{AggregateId, FarmId, UserId};
