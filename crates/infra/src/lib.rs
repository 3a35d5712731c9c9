//! Infrastructure layer: event storage, command dispatch, read models and
//! the breeding services built on them.

pub mod collaborators;
pub mod command_dispatcher;
pub mod directory;
pub mod event_store;
pub mod ledger;
pub mod pregnancy;
pub mod projections;
pub mod read_model;
pub mod registry;
pub mod reports;
pub mod workers;

mod integration_tests;

pub use collaborators::{AnimalRegistry, CollaboratorError, DirectoryEntry, UserDirectory};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use directory::UserAccounts;
pub use ledger::{DoseLedger, InseminationIndex, LedgerSettings, NewBull, RecordInsemination};
pub use pregnancy::PregnancyChecks;
pub use registry::{HerdRegistry, NewAnimal};
pub use reports::{DoseReport, DoseReportRow, Period, dose_report};
