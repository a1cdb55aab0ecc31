//! # Bedboard Core
//!
//! Core business logic for the in-patient bed board.
//!
//! This crate owns bed occupancy and admission numbering:
//! - [`sequence`]: daily `IPD-YYYYMMDD-NNN` admission numbers from an atomic per-day counter
//! - [`store`]: persistence contracts and the embedded `sled` implementation
//! - [`coordinator`]: admit/discharge across the counter and both stores, with compensation
//! - [`tat`]: turnaround-time countdown derived lazily from stored fields
//! - [`notifier`]: publish/subscribe fan-out of every bed mutation
//! - [`service`]: the facade used by API surfaces and the CLI
//!
//! **No API concerns**: HTTP servers and wire DTOs belong in `api-rest` and `api-shared`.

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod inventory;
pub mod model;
pub mod notifier;
pub mod sequence;
pub mod service;
pub mod store;
pub mod tat;

pub use config::CoreConfig;
pub use coordinator::{AdmissionCoordinator, AdmitRequest, ConsistencyIssue, ConsistencyReport};
pub use error::{BedError, BedResult, ErrorCategory, StoreError, StoreResult};
pub use ids::{AdmissionId, BedId, Department, PatientId};
pub use inventory::{BedInventory, InventoryBed, SeedReport};
pub use model::{Admission, AdmissionStatus, Bed, BedStatus, FormCatalogue, FormEntry, FormKey};
pub use notifier::{BedChangeKind, BedEvent, Delivery, SubscriptionHandle};
pub use sequence::{AdmissionNumber, DayKey};
pub use service::{BedBoardService, BedView};
pub use tat::{TatReading, TatStatus};
