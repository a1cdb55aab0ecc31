//! Durable store backed by an embedded `sled` database.
//!
//! Layout:
//!
//! ```text
//! <data_dir>/
//!   beds                 bed_id          -> JSON Bed
//!   admissions           16-byte uuid    -> JSON Admission
//!   admission_sequence   YYYYMMDD        -> u64 big-endian counter
//! ```
//!
//! Conditional writes are compare-and-swap loops against the exact bytes last read, so a
//! concurrent writer always forces a re-read rather than being overwritten. Admit and discharge
//! touch `beds` and `admissions` in one multi-tree transaction.

use super::{
    AdmissionStore, AdmissionUpdate, BedAdmissionTransactions, BedCondition, BedPatch, BedStore,
    BedUpdate, LinkedDischarge, SequenceStore,
};
use crate::constants::{ADMISSIONS_TREE, BEDS_TREE, SEQUENCE_TREE};
use crate::error::{StoreError, StoreResult};
use crate::ids::{AdmissionId, BedId};
use crate::model::{bed_board_order, Admission, AdmissionTransition, Bed};
use crate::sequence::DayKey;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    beds: Tree,
    admissions: Tree,
    sequence: Tree,
}

impl SledStore {
    /// Opens (or creates) the store under `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            beds: db.open_tree(BEDS_TREE)?,
            admissions: db.open_tree(ADMISSIONS_TREE)?,
            sequence: db.open_tree(SEQUENCE_TREE)?,
            db,
        })
    }

    /// Blocks until all written data is durable on disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(StoreError::Serialization)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(StoreError::Deserialization)
}

fn abort<T>(result: StoreResult<T>) -> Result<T, ConflictableTransactionError<StoreError>> {
    result.map_err(ConflictableTransactionError::Abort)
}

fn transaction_error(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StoreError::Sled(err),
    }
}

fn decode_counter(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

impl BedStore for SledStore {
    fn create_bed(&self, bed: &Bed) -> StoreResult<bool> {
        let swapped = self.beds.compare_and_swap(
            bed.bed_id.as_str().as_bytes(),
            None as Option<&[u8]>,
            Some(encode(bed)?),
        )?;
        Ok(swapped.is_ok())
    }

    fn get_bed(&self, bed_id: &BedId) -> StoreResult<Option<Bed>> {
        self.beds
            .get(bed_id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_beds(&self) -> StoreResult<Vec<Bed>> {
        let mut beds = Vec::new();
        for item in self.beds.iter() {
            let (_, bytes) = item?;
            beds.push(decode::<Bed>(&bytes)?);
        }
        beds.sort_by(bed_board_order);
        Ok(beds)
    }

    fn update_bed(
        &self,
        bed_id: &BedId,
        patch: &BedPatch,
        condition: BedCondition,
    ) -> StoreResult<Option<BedUpdate>> {
        let key = bed_id.as_str().as_bytes();
        loop {
            let Some(current_bytes) = self.beds.get(key)? else {
                return Ok(None);
            };
            let current: Bed = decode(&current_bytes)?;
            if !condition.holds(&current) {
                return Ok(Some(BedUpdate::Rejected(current)));
            }

            let mut next = current;
            patch.apply_to(&mut next, Utc::now());

            let swapped = self.beds.compare_and_swap(
                key,
                Some(current_bytes.as_ref()),
                Some(encode(&next)?),
            )?;
            match swapped {
                Ok(()) => return Ok(Some(BedUpdate::Applied(next))),
                Err(_) => {
                    tracing::debug!("bed {} changed concurrently, retrying update", bed_id);
                }
            }
        }
    }
}

impl AdmissionStore for SledStore {
    fn create_admission(&self, admission: &Admission) -> StoreResult<()> {
        let swapped = self.admissions.compare_and_swap(
            admission.id.as_key(),
            None as Option<&[u8]>,
            Some(encode(admission)?),
        )?;
        swapped.map_err(|_| StoreError::DuplicateKey(admission.id.to_string()))
    }

    fn get_admission(&self, id: AdmissionId) -> StoreResult<Option<Admission>> {
        self.admissions
            .get(id.as_key())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_admissions(&self) -> StoreResult<Vec<Admission>> {
        let mut admissions = Vec::new();
        for item in self.admissions.iter() {
            let (_, bytes) = item?;
            admissions.push(decode::<Admission>(&bytes)?);
        }
        Ok(admissions)
    }

    fn transition_admission(
        &self,
        id: AdmissionId,
        transition: AdmissionTransition,
    ) -> StoreResult<Option<AdmissionUpdate>> {
        let key = id.as_key();
        loop {
            let Some(current_bytes) = self.admissions.get(key)? else {
                return Ok(None);
            };
            let current: Admission = decode(&current_bytes)?;

            let mut next = current.clone();
            if !transition.apply_to(&mut next) {
                return Ok(Some(AdmissionUpdate::Rejected(current)));
            }

            let swapped = self.admissions.compare_and_swap(
                key,
                Some(current_bytes.as_ref()),
                Some(encode(&next)?),
            )?;
            if swapped.is_ok() {
                return Ok(Some(AdmissionUpdate::Applied(next)));
            }
        }
    }
}

impl BedAdmissionTransactions for SledStore {
    fn admit_with_bed(
        &self,
        admission: &Admission,
        patch: &BedPatch,
    ) -> StoreResult<Option<BedUpdate>> {
        let bed_key = admission.bed_id.as_str().as_bytes();
        let admission_key = admission.id.as_key();
        let admission_bytes = encode(admission)?;

        (&self.beds, &self.admissions)
            .transaction(|(beds, admissions)| {
                let Some(current_bytes) = beds.get(bed_key)? else {
                    return Ok(None);
                };
                let current: Bed = abort(decode(&current_bytes))?;
                if !BedCondition::Vacant.holds(&current) {
                    return Ok(Some(BedUpdate::Rejected(current)));
                }
                if admissions.get(admission_key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::DuplicateKey(
                        admission.id.to_string(),
                    )));
                }

                let mut next = current;
                patch.apply_to(&mut next, Utc::now());
                admissions.insert(&admission_key[..], admission_bytes.clone())?;
                beds.insert(bed_key, abort(encode(&next))?)?;
                Ok(Some(BedUpdate::Applied(next)))
            })
            .map_err(transaction_error)
    }

    fn discharge_with_bed(
        &self,
        bed_id: &BedId,
        admission_id: AdmissionId,
        transition: AdmissionTransition,
        patch: &BedPatch,
    ) -> StoreResult<LinkedDischarge> {
        let bed_key = bed_id.as_str().as_bytes();
        let admission_key = admission_id.as_key();

        (&self.beds, &self.admissions)
            .transaction(|(beds, admissions)| {
                let Some(bed_bytes) = beds.get(bed_key)? else {
                    return Ok(LinkedDischarge::BedNotFound);
                };
                let bed: Bed = abort(decode(&bed_bytes))?;
                if !BedCondition::OccupiedBy(admission_id).holds(&bed) {
                    return Ok(LinkedDischarge::BedRejected(bed));
                }
                let Some(admission_bytes) = admissions.get(admission_key)? else {
                    return Ok(LinkedDischarge::AdmissionNotFound);
                };
                let mut admission: Admission = abort(decode(&admission_bytes))?;
                if !transition.apply_to(&mut admission) {
                    return Ok(LinkedDischarge::AdmissionRejected(admission));
                }

                let mut next = bed;
                patch.apply_to(&mut next, Utc::now());
                admissions.insert(&admission_key[..], abort(encode(&admission))?)?;
                beds.insert(bed_key, abort(encode(&next))?)?;
                Ok(LinkedDischarge::Applied {
                    bed: next,
                    admission,
                })
            })
            .map_err(transaction_error)
    }
}

impl SequenceStore for SledStore {
    fn increment(&self, day_key: &DayKey) -> StoreResult<u64> {
        let key = day_key.to_string();
        let mut corrupt = false;

        // A counter row that cannot be advanced is written back unchanged, never reset.
        let updated = self.sequence.update_and_fetch(key.as_bytes(), |current| {
            corrupt = false;
            match current {
                None => Some(1u64.to_be_bytes().to_vec()),
                Some(bytes) => match decode_counter(bytes).and_then(|n| n.checked_add(1)) {
                    Some(next) => Some(next.to_be_bytes().to_vec()),
                    None => {
                        corrupt = true;
                        Some(bytes.to_vec())
                    }
                },
            }
        })?;

        if corrupt {
            return Err(StoreError::CorruptCounter(key));
        }
        updated
            .as_deref()
            .and_then(decode_counter)
            .ok_or(StoreError::CorruptCounter(key))
    }

    fn current(&self, day_key: &DayKey) -> StoreResult<u64> {
        let key = day_key.to_string();
        match self.sequence.get(key.as_bytes())? {
            None => Ok(0),
            Some(bytes) => decode_counter(&bytes).ok_or(StoreError::CorruptCounter(key)),
        }
    }
}
