//! # Admission Coordinator
//!
//! Drives the multi-step admit and discharge sequences across the sequence issuer, the admission
//! record store and the bed store.
//!
//! No lock is held across steps. When the stores support [`BedAdmissionTransactions`] the record
//! and bed writes of each operation commit together. Otherwise each store call is individually
//! atomic and the sequence is kept consistent by write conditions and compensation:
//!
//! - **admit**: issue number, write `ADMITTED` record, then occupy the bed only if it is still
//!   `VACANT`. If the bed write does not happen the record is marked `ROLLED_BACK`.
//! - **discharge**: mark the record `DISCHARGED` first, then release the bed only if it still
//!   points at that admission. A reader can therefore never see a vacant bed whose last
//!   admission is still `ADMITTED`.
//!
//! Nothing is retried internally. A failed admit may burn an admission number; numbers stay
//! unique but may have gaps.

use crate::config::CoreConfig;
use crate::error::{BedError, BedResult};
use crate::ids::{AdmissionId, BedId, Department, PatientId};
use crate::model::{Admission, AdmissionStatus, AdmissionTransition};
use crate::sequence::{AdmissionNumber, DayKey, SequenceIssuer};
use crate::store::{
    AdmissionStore, AdmissionUpdate, BedAdmissionTransactions, BedCondition, BedPatch, BedStore,
    BedUpdate, LinkedDischarge,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Inputs to [`AdmissionCoordinator::admit`].
#[derive(Clone, Debug)]
pub struct AdmitRequest {
    pub bed_id: BedId,
    pub patient_id: PatientId,
    pub department: Department,
    /// Defaults to now. Also determines the day key of the admission number.
    pub admitted_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AdmissionCoordinator {
    config: Arc<CoreConfig>,
    beds: Arc<dyn BedStore>,
    admissions: Arc<dyn AdmissionStore>,
    issuer: SequenceIssuer,
    transactions: Option<Arc<dyn BedAdmissionTransactions>>,
}

impl AdmissionCoordinator {
    pub fn new(
        config: Arc<CoreConfig>,
        beds: Arc<dyn BedStore>,
        admissions: Arc<dyn AdmissionStore>,
        issuer: SequenceIssuer,
    ) -> Self {
        Self {
            config,
            beds,
            admissions,
            issuer,
            transactions: None,
        }
    }

    /// Commits admit and discharge writes through `transactions` instead of compensating.
    ///
    /// `transactions` must be backed by the same records as the bed and admission stores.
    pub fn with_transactions(mut self, transactions: Arc<dyn BedAdmissionTransactions>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Admits a patient to a vacant bed.
    ///
    /// # Errors
    ///
    /// - [`BedError::BedNotFound`] / [`BedError::BedNotAvailable`]: nothing was written. A
    ///   concurrent admitter that wins the bed between our read and our write also yields
    ///   `BedNotAvailable` once our record has been rolled back.
    /// - [`BedError::SequenceUnavailable`]: no number issued, nothing written.
    /// - [`BedError::PartialAdmissionFailure`]: the admission record was written but the bed
    ///   could not be occupied. The error says whether the record was rolled back.
    pub fn admit(&self, request: AdmitRequest) -> BedResult<Admission> {
        let AdmitRequest {
            bed_id,
            patient_id,
            department,
            admitted_at,
        } = request;

        let bed = self
            .beds
            .get_bed(&bed_id)?
            .ok_or_else(|| BedError::BedNotFound(bed_id.clone()))?;
        if !bed.is_vacant() {
            return Err(BedError::BedNotAvailable(bed_id));
        }

        let admitted_at = admitted_at.unwrap_or_else(Utc::now);
        let day_key = DayKey::from_instant(admitted_at, self.config.utc_offset());
        let number = self.issuer.next_admission_number(day_key)?;

        let admission = Admission {
            id: AdmissionId::new(),
            number,
            patient_id: patient_id.clone(),
            bed_id: bed_id.clone(),
            bed_number: bed.bed_number.clone(),
            room_type: bed.room.room_type.clone(),
            department,
            admitted_at,
            discharged_at: None,
            rolled_back_at: None,
            status: AdmissionStatus::Admitted,
        };
        let patch = BedPatch::occupy(patient_id, admission.id, self.config.tat_duration_secs());
        if let Some(transactions) = &self.transactions {
            return self.admit_in_transaction(transactions.as_ref(), admission, &patch);
        }

        self.admissions.create_admission(&admission)?;
        match self.beds.update_bed(&bed_id, &patch, BedCondition::Vacant) {
            Ok(Some(BedUpdate::Applied(_))) => {
                tracing::info!(
                    "admitted {} to bed {} as {}",
                    admission.patient_id,
                    bed_id,
                    admission.number
                );
                Ok(admission)
            }
            Ok(Some(BedUpdate::Rejected(current))) => {
                tracing::warn!(
                    "bed {} was taken (now {}) while admitting {}, rolling back",
                    bed_id,
                    current.status(),
                    admission.number
                );
                self.compensate(&admission, BedError::BedNotAvailable(bed_id), false)
            }
            Ok(None) => {
                tracing::warn!(
                    "bed {} disappeared while admitting {}, rolling back",
                    bed_id,
                    admission.number
                );
                self.compensate(&admission, BedError::BedNotFound(bed_id), false)
            }
            Err(err) => {
                tracing::error!(
                    "failed to occupy bed {} for {}: {}",
                    bed_id,
                    admission.number,
                    err
                );
                self.compensate(&admission, BedError::Store(err), true)
            }
        }
    }

    fn admit_in_transaction(
        &self,
        transactions: &dyn BedAdmissionTransactions,
        admission: Admission,
        patch: &BedPatch,
    ) -> BedResult<Admission> {
        match transactions.admit_with_bed(&admission, patch) {
            Ok(Some(BedUpdate::Applied(_))) => {
                tracing::info!(
                    "admitted {} to bed {} as {}",
                    admission.patient_id,
                    admission.bed_id,
                    admission.number
                );
                Ok(admission)
            }
            Ok(Some(BedUpdate::Rejected(current))) => {
                tracing::warn!(
                    "bed {} was taken (now {}) while admitting, {} not used",
                    admission.bed_id,
                    current.status(),
                    admission.number
                );
                Err(BedError::BedNotAvailable(admission.bed_id))
            }
            Ok(None) => Err(BedError::BedNotFound(admission.bed_id)),
            Err(err) => {
                tracing::error!(
                    "admission {} to bed {} not committed: {}",
                    admission.number,
                    admission.bed_id,
                    err
                );
                Err(BedError::Store(err))
            }
        }
    }

    /// Rolls back `admission` after its bed write did not happen.
    ///
    /// A failed bed write (`partial`) is always reported as a partial failure. A rejected write
    /// is reported as `cause` when the rollback succeeds.
    fn compensate(
        &self,
        admission: &Admission,
        cause: BedError,
        partial: bool,
    ) -> BedResult<Admission> {
        let compensation = self.roll_back(admission);
        match &compensation {
            Ok(()) => tracing::warn!(
                "admission {} ({}) marked ROLLED_BACK",
                admission.number,
                admission.id
            ),
            Err(err) => tracing::error!(
                "compensation failed for admission {} ({}): {}; manual reconciliation required",
                admission.number,
                admission.id,
                err
            ),
        }

        match compensation {
            Ok(()) if !partial => Err(cause),
            outcome => Err(partial_admission_failure(
                admission,
                cause,
                outcome.err(),
            )),
        }
    }

    fn roll_back(&self, admission: &Admission) -> BedResult<()> {
        let transition = AdmissionTransition::RollBack { at: Utc::now() };
        match self.admissions.transition_admission(admission.id, transition)? {
            Some(AdmissionUpdate::Applied(_)) => Ok(()),
            Some(AdmissionUpdate::Rejected(current)) => Err(BedError::AdmissionNotActive {
                admission_id: current.id,
                status: current.status,
            }),
            None => Err(BedError::AdmissionNotFound(admission.id)),
        }
    }

    /// Discharges the patient occupying `bed_id` and returns the closed admission.
    ///
    /// Safe to retry: if a previous attempt closed the admission but failed to release the bed,
    /// calling again finishes the release.
    ///
    /// # Errors
    ///
    /// - [`BedError::BedNotOccupied`]: the bed is vacant, or a concurrent discharge released it.
    /// - [`BedError::AdmissionNotActive`] / [`BedError::AdmissionNotFound`]: the bed points at a
    ///   record that cannot be discharged; run a consistency check.
    /// - [`BedError::PartialDischargeFailure`]: the admission is `DISCHARGED` but the bed is
    ///   still occupied.
    pub fn discharge(
        &self,
        bed_id: &BedId,
        discharged_at: Option<DateTime<Utc>>,
    ) -> BedResult<Admission> {
        let bed = self
            .beds
            .get_bed(bed_id)?
            .ok_or_else(|| BedError::BedNotFound(bed_id.clone()))?;
        let Some(admission_id) = bed.active_admission_id() else {
            return Err(BedError::BedNotOccupied(bed_id.clone()));
        };

        let discharged_at = discharged_at.unwrap_or_else(Utc::now);
        let transition = AdmissionTransition::Discharge { at: discharged_at };
        let patch = BedPatch::release(self.config.tat_duration_secs());

        if let Some(transactions) = &self.transactions {
            match transactions.discharge_with_bed(bed_id, admission_id, transition, &patch)? {
                LinkedDischarge::Applied { admission, .. } => {
                    tracing::info!("discharged {} from bed {}", admission.number, bed_id);
                    return Ok(admission);
                }
                LinkedDischarge::BedNotFound => return Err(BedError::BedNotFound(bed_id.clone())),
                LinkedDischarge::BedRejected(_) => {
                    return Err(BedError::BedNotOccupied(bed_id.clone()))
                }
                LinkedDischarge::AdmissionNotFound => {
                    return Err(BedError::AdmissionNotFound(admission_id))
                }
                // Left behind by an earlier partial discharge: finish releasing the bed below.
                LinkedDischarge::AdmissionRejected(current)
                    if current.status == AdmissionStatus::Discharged => {}
                LinkedDischarge::AdmissionRejected(current) => {
                    return Err(BedError::AdmissionNotActive {
                        admission_id,
                        status: current.status,
                    })
                }
            }
        }

        let admission = match self.admissions.transition_admission(admission_id, transition)? {
            Some(AdmissionUpdate::Applied(admission)) => admission,
            Some(AdmissionUpdate::Rejected(current))
                if current.status == AdmissionStatus::Discharged =>
            {
                tracing::info!(
                    "admission {} already discharged, releasing bed {}",
                    current.number,
                    bed_id
                );
                current
            }
            Some(AdmissionUpdate::Rejected(current)) => {
                return Err(BedError::AdmissionNotActive {
                    admission_id,
                    status: current.status,
                })
            }
            None => return Err(BedError::AdmissionNotFound(admission_id)),
        };

        match self
            .beds
            .update_bed(bed_id, &patch, BedCondition::OccupiedBy(admission_id))
        {
            Ok(Some(BedUpdate::Applied(_))) => {
                tracing::info!("discharged {} from bed {}", admission.number, bed_id);
                Ok(admission)
            }
            Ok(Some(BedUpdate::Rejected(_))) | Ok(None) => {
                Err(BedError::BedNotOccupied(bed_id.clone()))
            }
            Err(err) => {
                tracing::error!(
                    "admission {} discharged but bed {} not released: {}",
                    admission.number,
                    bed_id,
                    err
                );
                Err(BedError::PartialDischargeFailure {
                    bed_id: bed_id.clone(),
                    admission_id,
                    source: Box::new(BedError::Store(err)),
                })
            }
        }
    }

    /// Cross-checks beds against admission records.
    ///
    /// Reads beds and admissions in two passes without a lock, so an admit or discharge in
    /// flight during the check may show up as a transient issue. Re-run before reconciling.
    pub fn check_consistency(&self) -> BedResult<ConsistencyReport> {
        let beds = self.beds.list_beds()?;
        let admissions = self.admissions.list_admissions()?;

        let admissions_by_id: HashMap<AdmissionId, &Admission> =
            admissions.iter().map(|a| (a.id, a)).collect();
        let active_by_bed: HashMap<&BedId, AdmissionId> = beds
            .iter()
            .filter_map(|bed| bed.active_admission_id().map(|id| (&bed.bed_id, id)))
            .collect();

        let mut issues = Vec::new();
        for bed in &beds {
            let Some(admission_id) = bed.active_admission_id() else {
                continue;
            };
            let bed_id = bed.bed_id.clone();
            match admissions_by_id.get(&admission_id) {
                None => issues.push(ConsistencyIssue::OccupiedBedMissingAdmission {
                    bed_id,
                    admission_id,
                }),
                Some(admission) if !admission.is_active() => {
                    issues.push(ConsistencyIssue::OccupiedBedAdmissionNotAdmitted {
                        bed_id,
                        admission_id,
                        status: admission.status,
                    })
                }
                Some(admission) if admission.bed_id != bed_id => {
                    issues.push(ConsistencyIssue::BedAdmissionMismatch {
                        bed_id,
                        admission_id,
                        admission_bed_id: admission.bed_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        for admission in admissions.iter().filter(|a| a.is_active()) {
            if active_by_bed.get(&admission.bed_id) != Some(&admission.id) {
                issues.push(ConsistencyIssue::OrphanedAdmission {
                    admission_id: admission.id,
                    admission_number: admission.number.clone(),
                    bed_id: admission.bed_id.clone(),
                });
            }
        }

        if !issues.is_empty() {
            tracing::warn!("consistency check found {} issue(s)", issues.len());
        }

        Ok(ConsistencyReport {
            checked_at: Utc::now(),
            beds_checked: beds.len(),
            admissions_checked: admissions.len(),
            issues,
        })
    }
}

fn partial_admission_failure(
    admission: &Admission,
    cause: BedError,
    compensation_error: Option<BedError>,
) -> BedError {
    BedError::PartialAdmissionFailure {
        bed_id: admission.bed_id.clone(),
        admission_id: admission.id,
        admission_number: admission.number.clone(),
        source: Box::new(cause),
        compensation_error: compensation_error.map(Box::new),
    }
}

/// A disagreement between the bed board and the admission records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// The bed references an admission record that does not exist.
    OccupiedBedMissingAdmission {
        bed_id: BedId,
        admission_id: AdmissionId,
    },
    /// The bed references an admission that is not `ADMITTED`.
    OccupiedBedAdmissionNotAdmitted {
        bed_id: BedId,
        admission_id: AdmissionId,
        status: AdmissionStatus,
    },
    /// The referenced admission belongs to a different bed.
    BedAdmissionMismatch {
        bed_id: BedId,
        admission_id: AdmissionId,
        admission_bed_id: BedId,
    },
    /// An `ADMITTED` record whose bed does not point back at it.
    OrphanedAdmission {
        admission_id: AdmissionId,
        admission_number: AdmissionNumber,
        bed_id: BedId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub checked_at: DateTime<Utc>,
    pub beds_checked: usize,
    pub admissions_checked: usize,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, StoreError, StoreResult};
    use crate::model::{Bed, RoomInfo};
    use crate::store::{SequenceStore, SledStore};
    use crate::tat::TatStatus;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Bed store whose updates can be switched to fail.
    struct FlakyBeds {
        inner: Arc<SledStore>,
        fail_updates: AtomicBool,
    }

    impl BedStore for FlakyBeds {
        fn create_bed(&self, bed: &Bed) -> StoreResult<bool> {
            self.inner.create_bed(bed)
        }

        fn get_bed(&self, bed_id: &BedId) -> StoreResult<Option<Bed>> {
            self.inner.get_bed(bed_id)
        }

        fn list_beds(&self) -> StoreResult<Vec<Bed>> {
            self.inner.list_beds()
        }

        fn update_bed(
            &self,
            bed_id: &BedId,
            patch: &BedPatch,
            condition: BedCondition,
        ) -> StoreResult<Option<BedUpdate>> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("bed tree offline".into()));
            }
            self.inner.update_bed(bed_id, patch, condition)
        }
    }

    /// Admission store whose status transitions can be switched to fail.
    struct FlakyAdmissions {
        inner: Arc<SledStore>,
        fail_transitions: AtomicBool,
    }

    impl AdmissionStore for FlakyAdmissions {
        fn create_admission(&self, admission: &Admission) -> StoreResult<()> {
            self.inner.create_admission(admission)
        }

        fn get_admission(&self, id: AdmissionId) -> StoreResult<Option<Admission>> {
            self.inner.get_admission(id)
        }

        fn list_admissions(&self) -> StoreResult<Vec<Admission>> {
            self.inner.list_admissions()
        }

        fn transition_admission(
            &self,
            id: AdmissionId,
            transition: AdmissionTransition,
        ) -> StoreResult<Option<AdmissionUpdate>> {
            if self.fail_transitions.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("admission tree offline".into()));
            }
            self.inner.transition_admission(id, transition)
        }
    }

    struct DownSequence;

    impl SequenceStore for DownSequence {
        fn increment(&self, _day_key: &DayKey) -> StoreResult<u64> {
            Err(StoreError::Unavailable("counter row locked".into()))
        }

        fn current(&self, _day_key: &DayKey) -> StoreResult<u64> {
            Err(StoreError::Unavailable("counter row locked".into()))
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        store: Arc<SledStore>,
        beds: Arc<FlakyBeds>,
        admissions: Arc<FlakyAdmissions>,
        coordinator: AdmissionCoordinator,
    }

    fn config() -> Arc<CoreConfig> {
        Arc::new(
            CoreConfig::new(
                "unused".into(),
                1800,
                FixedOffset::east_opt(0).unwrap(),
                crate::model::FormCatalogue::builtin(),
            )
            .unwrap(),
        )
    }

    fn harness() -> Harness {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(SledStore::open(temp_dir.path()).expect("open store"));
        for (id, number) in [("B5", "B-5"), ("B6", "B-6")] {
            store
                .create_bed(&Bed::vacant(
                    BedId::parse(id).unwrap(),
                    number.into(),
                    RoomInfo {
                        room_type: "General Ward".into(),
                        daily_rate: Some(200_000),
                    },
                    1800,
                    Utc::now(),
                ))
                .unwrap();
        }

        let beds = Arc::new(FlakyBeds {
            inner: Arc::clone(&store),
            fail_updates: AtomicBool::new(false),
        });
        let admissions = Arc::new(FlakyAdmissions {
            inner: Arc::clone(&store),
            fail_transitions: AtomicBool::new(false),
        });
        let coordinator = AdmissionCoordinator::new(
            config(),
            beds.clone(),
            admissions.clone(),
            SequenceIssuer::new(store.clone()),
        );

        Harness {
            _temp_dir: temp_dir,
            store,
            beds,
            admissions,
            coordinator,
        }
    }

    fn at_ten() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn request(bed: &str, patient: &str) -> AdmitRequest {
        AdmitRequest {
            bed_id: BedId::parse(bed).unwrap(),
            patient_id: PatientId::parse(patient).unwrap(),
            department: Department::parse("General Medicine").unwrap(),
            admitted_at: Some(at_ten()),
        }
    }

    fn bed(h: &Harness, id: &str) -> Bed {
        h.store.get_bed(&BedId::parse(id).unwrap()).unwrap().unwrap()
    }

    #[test]
    fn admits_with_daily_sequence_numbers() {
        let h = harness();

        let first = h.coordinator.admit(request("B5", "P")).unwrap();
        assert_eq!(first.number.to_string(), "IPD-20240301-001");
        assert_eq!(first.status, AdmissionStatus::Admitted);
        assert_eq!(first.bed_number, "B-5");

        let b5 = bed(&h, "B5");
        assert_eq!(b5.active_admission_id(), Some(first.id));
        assert_eq!(b5.occupancy.patient_id().map(PatientId::as_str), Some("P"));
        assert_eq!(b5.tat.status, TatStatus::Idle);
        assert!(b5.forms.is_empty());

        let second = h.coordinator.admit(request("B6", "Q")).unwrap();
        assert_eq!(second.number.to_string(), "IPD-20240301-002");
    }

    #[test]
    fn admitting_to_an_occupied_bed_changes_nothing() {
        let h = harness();
        h.coordinator.admit(request("B5", "P")).unwrap();
        let before = bed(&h, "B5");

        let err = h.coordinator.admit(request("B5", "Q")).unwrap_err();
        assert!(matches!(err, BedError::BedNotAvailable(_)));
        assert_eq!(err.category(), ErrorCategory::Validation);

        assert_eq!(bed(&h, "B5"), before);
        assert_eq!(h.store.list_admissions().unwrap().len(), 1);
        assert_eq!(
            h.store.current(&DayKey::parse("20240301").unwrap()).unwrap(),
            1
        );
    }

    #[test]
    fn unknown_bed_is_rejected_before_numbering() {
        let h = harness();
        let err = h.coordinator.admit(request("B99", "P")).unwrap_err();
        assert!(matches!(err, BedError::BedNotFound(_)));
        assert_eq!(
            h.store.current(&DayKey::parse("20240301").unwrap()).unwrap(),
            0
        );
    }

    #[test]
    fn sequence_failure_aborts_before_any_write() {
        let h = harness();
        let coordinator = AdmissionCoordinator::new(
            config(),
            h.beds.clone(),
            h.admissions.clone(),
            SequenceIssuer::new(Arc::new(DownSequence)),
        );

        let err = coordinator.admit(request("B5", "P")).unwrap_err();
        assert!(matches!(err, BedError::SequenceUnavailable { .. }));
        assert_eq!(err.category(), ErrorCategory::Sequence);
        assert!(h.store.list_admissions().unwrap().is_empty());
        assert!(bed(&h, "B5").is_vacant());
    }

    #[test]
    fn failed_bed_write_rolls_back_admission() {
        let h = harness();
        h.beds.fail_updates.store(true, Ordering::SeqCst);

        let err = h.coordinator.admit(request("B5", "P")).unwrap_err();
        match &err {
            BedError::PartialAdmissionFailure {
                compensation_error,
                admission_number,
                ..
            } => {
                assert!(compensation_error.is_none());
                assert_eq!(admission_number.to_string(), "IPD-20240301-001");
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert_eq!(err.category(), ErrorCategory::PartialFailure);

        let admissions = h.store.list_admissions().unwrap();
        assert_eq!(admissions.len(), 1);
        assert_eq!(admissions[0].status, AdmissionStatus::RolledBack);
        assert!(admissions[0].rolled_back_at.is_some());
        assert!(bed(&h, "B5").is_vacant());
        assert!(h.coordinator.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn failed_compensation_is_reported_and_detectable() {
        let h = harness();
        h.beds.fail_updates.store(true, Ordering::SeqCst);
        h.admissions.fail_transitions.store(true, Ordering::SeqCst);

        let err = h.coordinator.admit(request("B5", "P")).unwrap_err();
        assert!(matches!(
            err,
            BedError::PartialAdmissionFailure {
                compensation_error: Some(_),
                ..
            }
        ));
        assert!(err.to_string().contains("compensation failed"));

        let report = h.coordinator.check_consistency().unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0],
            ConsistencyIssue::OrphanedAdmission { .. }
        ));
    }

    #[test]
    fn concurrent_admits_to_one_bed_have_a_single_winner() {
        let h = harness();
        const CONTENDERS: usize = 6;

        let results: Vec<BedResult<Admission>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..CONTENDERS)
                .map(|i| {
                    let coordinator = h.coordinator.clone();
                    scope.spawn(move || coordinator.admit(request("B5", &format!("P{i}"))))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked"))
                .collect()
        });

        let winners: Vec<&Admission> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BedError::BedNotAvailable(_))));

        assert_eq!(bed(&h, "B5").active_admission_id(), Some(winners[0].id));
        let active = h
            .store
            .list_admissions()
            .unwrap()
            .into_iter()
            .filter(Admission::is_active)
            .count();
        assert_eq!(active, 1);
        assert!(h.coordinator.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn discharge_clears_bed_and_closes_admission() {
        let h = harness();
        let admission = h.coordinator.admit(request("B5", "P")).unwrap();
        h.store
            .update_bed(
                &admission.bed_id,
                &BedPatch::form(
                    crate::model::FormKey::parse("admission_consent").unwrap(),
                    crate::model::FormEntry {
                        submitted: true,
                        payload: Some(serde_json::json!({ "signed_by": "guardian" })),
                        updated_at: Utc::now(),
                    },
                ),
                BedCondition::OccupiedBy(admission.id),
            )
            .unwrap();

        let discharged_at = at_ten() + chrono::Duration::days(3);
        let closed = h
            .coordinator
            .discharge(&admission.bed_id, Some(discharged_at))
            .unwrap();
        assert_eq!(closed.id, admission.id);
        assert_eq!(closed.status, AdmissionStatus::Discharged);
        assert_eq!(closed.discharged_at, Some(discharged_at));

        let b5 = bed(&h, "B5");
        assert!(b5.is_vacant());
        assert!(b5.forms.is_empty());
        assert_eq!(b5.tat, crate::tat::TatState::idle(1800));

        let err = h.coordinator.discharge(&admission.bed_id, None).unwrap_err();
        assert!(matches!(err, BedError::BedNotOccupied(_)));
    }

    #[test]
    fn discharge_retry_finishes_bed_release() {
        let h = harness();
        let admission = h.coordinator.admit(request("B5", "P")).unwrap();

        h.beds.fail_updates.store(true, Ordering::SeqCst);
        let err = h.coordinator.discharge(&admission.bed_id, None).unwrap_err();
        assert!(matches!(err, BedError::PartialDischargeFailure { .. }));
        assert_eq!(err.category(), ErrorCategory::PartialFailure);

        let report = h.coordinator.check_consistency().unwrap();
        assert!(matches!(
            report.issues.as_slice(),
            [ConsistencyIssue::OccupiedBedAdmissionNotAdmitted {
                status: AdmissionStatus::Discharged,
                ..
            }]
        ));

        h.beds.fail_updates.store(false, Ordering::SeqCst);
        let closed = h.coordinator.discharge(&admission.bed_id, None).unwrap();
        assert_eq!(closed.status, AdmissionStatus::Discharged);
        assert!(bed(&h, "B5").is_vacant());
        assert!(h.coordinator.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn mixed_workload_preserves_invariants() {
        let h = harness();
        let beds = ["B5", "B6"];

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let coordinator = h.coordinator.clone();
                scope.spawn(move || {
                    for round in 0..10 {
                        let bed_id = beds[(worker + round) % beds.len()];
                        let _ = coordinator.admit(request(bed_id, &format!("P{worker}-{round}")));
                        if round % 3 == 0 {
                            let _ = coordinator.discharge(&BedId::parse(bed_id).unwrap(), None);
                        }
                    }
                });
            }
        });

        assert!(h.coordinator.check_consistency().unwrap().is_consistent());

        let numbers: std::collections::HashSet<String> = h
            .store
            .list_admissions()
            .unwrap()
            .iter()
            .map(|a| a.number.to_string())
            .collect();
        assert_eq!(numbers.len(), h.store.list_admissions().unwrap().len());
    }

    #[test]
    fn transactional_contenders_leave_no_rolled_back_records() {
        let h = harness();
        let coordinator = h.coordinator.clone().with_transactions(h.store.clone());

        let results: Vec<BedResult<Admission>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|i| {
                    let coordinator = coordinator.clone();
                    scope.spawn(move || coordinator.admit(request("B5", &format!("P{i}"))))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked"))
                .collect()
        });

        let winners: Vec<&Admission> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BedError::BedNotAvailable(_))));

        let admissions = h.store.list_admissions().unwrap();
        assert_eq!(admissions.len(), 1);
        assert_eq!(admissions[0].id, winners[0].id);
        assert_eq!(bed(&h, "B5").active_admission_id(), Some(winners[0].id));
    }

    #[test]
    fn transactional_admit_ignores_failing_bed_store_writes() {
        let h = harness();
        let coordinator = h.coordinator.clone().with_transactions(h.store.clone());
        h.beds.fail_updates.store(true, Ordering::SeqCst);

        let admission = coordinator.admit(request("B5", "P")).unwrap();
        assert_eq!(bed(&h, "B5").active_admission_id(), Some(admission.id));

        let closed = coordinator.discharge(&admission.bed_id, None).unwrap();
        assert_eq!(closed.status, AdmissionStatus::Discharged);
        assert!(bed(&h, "B5").is_vacant());
        assert!(coordinator.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn transactional_discharge_finishes_an_earlier_partial_discharge() {
        let h = harness();
        let admission = h.coordinator.admit(request("B5", "P")).unwrap();

        h.beds.fail_updates.store(true, Ordering::SeqCst);
        let err = h.coordinator.discharge(&admission.bed_id, None).unwrap_err();
        assert!(matches!(err, BedError::PartialDischargeFailure { .. }));
        h.beds.fail_updates.store(false, Ordering::SeqCst);

        let coordinator = h.coordinator.clone().with_transactions(h.store.clone());
        let closed = coordinator.discharge(&admission.bed_id, None).unwrap();
        assert_eq!(closed.id, admission.id);
        assert!(bed(&h, "B5").is_vacant());
        assert!(coordinator.check_consistency().unwrap().is_consistent());
    }
}
