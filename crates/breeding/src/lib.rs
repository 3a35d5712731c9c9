//! Breeding domain module (event-sourced).
//!
//! A bull's semen stock and the inseminations that consumed it live in one
//! stream, so a dose change and the records it pays for always commit
//! together. Pure domain logic; no IO.

pub mod bull;
pub mod error;
pub mod insemination;

pub use bull::{
    Bull, BullCommand, BullEvent, BullId, BullRegistered, BullRemoved, ConsumeDoses,
    DosesConsumed, DosesWrittenOff, InseminationReversed, InseminationStatusChanged,
    RegisterBull, RemoveBull, ReverseInsemination, SetInseminationStatus, WriteOffDoses,
};
pub use error::BreedingError;
pub use insemination::{InseminationId, InseminationRecord, InseminationStatus, Lifecycle};
