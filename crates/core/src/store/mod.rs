//! Persistence contracts for beds, admissions and the daily admission counter.
//!
//! Stores hold no business rules. What they do guarantee:
//!
//! - a bed update touches only the fields named in its [`BedPatch`] and is applied against the
//!   latest stored record, never a stale in-memory copy;
//! - a bed update is applied only if its [`BedCondition`] holds at write time, otherwise the
//!   current record is returned as [`BedUpdate::Rejected`];
//! - admission status changes are conditional on the record still being `ADMITTED`;
//! - the counter increment is a single atomic operation;
//! - a [`BedAdmissionTransactions`] store writes the bed and its admission record together or
//!   not at all.

mod sled_store;

pub use sled_store::SledStore;

use crate::error::StoreResult;
use crate::ids::{AdmissionId, BedId, PatientId};
use crate::model::{Admission, AdmissionTransition, Bed, FormEntry, FormKey, Occupancy};
use crate::sequence::DayKey;
use crate::tat::{TatState, TatStatus};
use chrono::{DateTime, Utc};

/// Change to the forms map of a bed.
#[derive(Clone, Debug, PartialEq)]
pub enum FormsPatch {
    Set { key: FormKey, entry: FormEntry },
    ClearAll,
}

/// Partial bed update. `None` fields are left as stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BedPatch {
    pub occupancy: Option<Occupancy>,
    pub tat: Option<TatState>,
    pub forms: Option<FormsPatch>,
}

impl BedPatch {
    /// Marks the bed occupied and resets all admission-scoped bed-side state.
    pub fn occupy(patient_id: PatientId, admission_id: AdmissionId, tat_duration_secs: u64) -> Self {
        Self {
            occupancy: Some(Occupancy::Occupied {
                patient_id,
                admission_id,
            }),
            tat: Some(TatState::idle(tat_duration_secs)),
            forms: Some(FormsPatch::ClearAll),
        }
    }

    /// Returns the bed to `VACANT` with cleared TAT and form state.
    pub fn release(tat_duration_secs: u64) -> Self {
        Self {
            occupancy: Some(Occupancy::Vacant),
            tat: Some(TatState::idle(tat_duration_secs)),
            forms: Some(FormsPatch::ClearAll),
        }
    }

    pub fn form(key: FormKey, entry: FormEntry) -> Self {
        Self {
            forms: Some(FormsPatch::Set { key, entry }),
            ..Self::default()
        }
    }

    pub fn tat(state: TatState) -> Self {
        Self {
            tat: Some(state),
            ..Self::default()
        }
    }

    /// Applies the patch and records the mutation on the bed.
    pub fn apply_to(&self, bed: &mut Bed, now: DateTime<Utc>) {
        if let Some(occupancy) = &self.occupancy {
            bed.occupancy = occupancy.clone();
        }
        if let Some(tat) = &self.tat {
            bed.tat = tat.clone();
        }
        match &self.forms {
            Some(FormsPatch::Set { key, entry }) => {
                bed.forms.insert(key.clone(), entry.clone());
            }
            Some(FormsPatch::ClearAll) => bed.forms.clear(),
            None => {}
        }
        bed.revision = bed.revision.saturating_add(1);
        bed.updated_at = now;
    }
}

/// Precondition checked against the stored bed at write time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BedCondition {
    Vacant,
    OccupiedBy(AdmissionId),
    OccupiedWithTat {
        admission_id: AdmissionId,
        tat_status: TatStatus,
    },
}

impl BedCondition {
    pub fn holds(&self, bed: &Bed) -> bool {
        match self {
            BedCondition::Vacant => bed.is_vacant(),
            BedCondition::OccupiedBy(admission_id) => {
                bed.active_admission_id() == Some(*admission_id)
            }
            BedCondition::OccupiedWithTat {
                admission_id,
                tat_status,
            } => bed.active_admission_id() == Some(*admission_id) && bed.tat.status == *tat_status,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BedUpdate {
    /// The patch was applied; carries the stored result.
    Applied(Bed),
    /// The condition failed; carries the record as currently stored.
    Rejected(Bed),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionUpdate {
    Applied(Admission),
    /// The record was no longer `ADMITTED`; carries it as currently stored.
    Rejected(Admission),
}

pub trait BedStore: Send + Sync {
    /// Inserts `bed` unless a bed with the same id exists. Returns whether it was inserted.
    fn create_bed(&self, bed: &Bed) -> StoreResult<bool>;

    fn get_bed(&self, bed_id: &BedId) -> StoreResult<Option<Bed>>;

    /// All beds in bed board order.
    fn list_beds(&self) -> StoreResult<Vec<Bed>>;

    /// Conditionally applies `patch`. Returns `None` if the bed does not exist.
    fn update_bed(
        &self,
        bed_id: &BedId,
        patch: &BedPatch,
        condition: BedCondition,
    ) -> StoreResult<Option<BedUpdate>>;
}

pub trait AdmissionStore: Send + Sync {
    /// Inserts a new record. Fails with `StoreError::DuplicateKey` if the id is taken.
    fn create_admission(&self, admission: &Admission) -> StoreResult<()>;

    fn get_admission(&self, id: AdmissionId) -> StoreResult<Option<Admission>>;

    fn list_admissions(&self) -> StoreResult<Vec<Admission>>;

    /// Applies `transition` if the record is still `ADMITTED`. Returns `None` if it does not exist.
    fn transition_admission(
        &self,
        id: AdmissionId,
        transition: AdmissionTransition,
    ) -> StoreResult<Option<AdmissionUpdate>>;
}

/// Result of a discharge applied across both records in one transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkedDischarge {
    Applied { bed: Bed, admission: Admission },
    BedNotFound,
    /// The bed no longer points at the admission; carries the bed as stored.
    BedRejected(Bed),
    AdmissionNotFound,
    /// The admission is no longer `ADMITTED`; carries it as stored.
    AdmissionRejected(Admission),
}

/// Bed and admission writes committed in a single transaction.
///
/// Implemented by stores that keep both record kinds in one database. When a rejection or an
/// error is returned neither record has changed.
pub trait BedAdmissionTransactions: Send + Sync {
    /// Creates `admission` and applies `patch` to its bed, provided the bed is still `VACANT`.
    /// Returns `None` if the bed does not exist.
    fn admit_with_bed(&self, admission: &Admission, patch: &BedPatch)
        -> StoreResult<Option<BedUpdate>>;

    /// Applies `transition` to the admission and `patch` to `bed_id`, provided the bed is still
    /// occupied by that admission and the admission is still `ADMITTED`.
    fn discharge_with_bed(
        &self,
        bed_id: &BedId,
        admission_id: AdmissionId,
        transition: AdmissionTransition,
        patch: &BedPatch,
    ) -> StoreResult<LinkedDischarge>;
}

pub trait SequenceStore: Send + Sync {
    /// Atomically advances the counter for `day_key` and returns the new value (first call: 1).
    fn increment(&self, day_key: &DayKey) -> StoreResult<u64>;

    /// Current counter value without advancing it (0 if never issued).
    fn current(&self, day_key: &DayKey) -> StoreResult<u64>;
}
