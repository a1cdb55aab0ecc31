//! Bed and admission records.

mod admission;
mod bed;
mod forms;

pub use admission::{Admission, AdmissionStatus, AdmissionTransition};
pub use bed::{bed_board_order, Bed, BedStatus, Occupancy, RoomInfo};
pub use forms::{FormCatalogue, FormEntry, FormKey};
