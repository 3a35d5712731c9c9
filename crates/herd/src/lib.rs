//! Herd domain module (event-sourced).
//!
//! The animal registry's write model: registration, breeding history and
//! archiving. Pure domain logic; no IO.

pub mod animal;

pub use animal::{
    Animal, AnimalArchived, AnimalCommand, AnimalEvent, AnimalId, AnimalRegistered, AnimalStatus,
    ArchiveAnimal, BreedingRecorded, BreedingReverted, RecordBreeding, RegisterAnimal,
    RevertBreeding,
};
