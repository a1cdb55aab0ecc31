//! Service facade exposed to API surfaces and the CLI.
//!
//! [`BedBoardService`] wires the durable store, the change notifier, the sequence issuer and the
//! admission coordinator together. All bed mutations go through a [`NotifyingBedStore`] or, for
//! the durable store's admit and discharge transactions, a [`NotifyingTransactions`], so
//! subscribers see every applied change whichever operation produced it.
//!
//! Every method is blocking; async callers run them on a blocking thread.

use crate::config::CoreConfig;
use crate::coordinator::{AdmissionCoordinator, AdmitRequest, ConsistencyReport};
use crate::error::{BedError, BedResult};
use crate::ids::{AdmissionId, BedId};
use crate::inventory::{InventoryBed, SeedReport};
use crate::model::{Admission, AdmissionStatus, Bed, FormEntry};
use crate::notifier::{
    BedEvent, ChangeNotifier, Delivery, NotifyingBedStore, NotifyingTransactions,
    SubscriptionHandle,
};
use crate::sequence::{DayKey, SequenceIssuer};
use crate::store::{
    AdmissionStore, BedCondition, BedPatch, BedStore, BedUpdate, SequenceStore, SledStore,
};
use crate::tat::{TatReading, TatState, TatStatus, TatTimer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A bed together with its countdown evaluated at read time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BedView {
    pub bed: Bed,
    pub tat: TatReading,
}

impl BedView {
    pub fn at(bed: Bed, now: DateTime<Utc>) -> Self {
        let tat = TatTimer::evaluate(&bed.tat, now);
        Self { bed, tat }
    }
}

#[derive(Clone)]
pub struct BedBoardService {
    config: Arc<CoreConfig>,
    beds: Arc<dyn BedStore>,
    admissions: Arc<dyn AdmissionStore>,
    issuer: SequenceIssuer,
    notifier: Arc<ChangeNotifier>,
    coordinator: AdmissionCoordinator,
    durable: Option<Arc<SledStore>>,
}

impl BedBoardService {
    /// Opens the durable store under the configured data directory.
    pub fn open(config: CoreConfig) -> BedResult<Self> {
        let store = Arc::new(SledStore::open(config.data_dir())?);
        tracing::info!("opened bed store at {}", config.data_dir().display());
        let mut service = Self::with_stores(config, store.clone(), store.clone(), store.clone());
        let transactions =
            NotifyingTransactions::new(store.clone(), Arc::clone(&service.notifier));
        service.coordinator = service.coordinator.with_transactions(Arc::new(transactions));
        service.durable = Some(store);
        Ok(service)
    }

    /// Builds the service over arbitrary store implementations.
    ///
    /// Admit and discharge use compensation rather than transactions on these stores.
    pub fn with_stores(
        config: CoreConfig,
        beds: Arc<dyn BedStore>,
        admissions: Arc<dyn AdmissionStore>,
        sequences: Arc<dyn SequenceStore>,
    ) -> Self {
        let config = Arc::new(config);
        let notifier = Arc::new(ChangeNotifier::new());
        let beds: Arc<dyn BedStore> =
            Arc::new(NotifyingBedStore::new(beds, Arc::clone(&notifier)));
        let issuer = SequenceIssuer::new(sequences);
        let coordinator = AdmissionCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&beds),
            Arc::clone(&admissions),
            issuer.clone(),
        );

        Self {
            config,
            beds,
            admissions,
            issuer,
            notifier,
            coordinator,
            durable: None,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The full bed board in bed board order.
    pub fn list_beds(&self) -> BedResult<Vec<BedView>> {
        let now = Utc::now();
        Ok(self
            .beds
            .list_beds()?
            .into_iter()
            .map(|bed| BedView::at(bed, now))
            .collect())
    }

    pub fn get_bed(&self, bed_id: &BedId) -> BedResult<BedView> {
        let bed = self
            .beds
            .get_bed(bed_id)?
            .ok_or_else(|| BedError::BedNotFound(bed_id.clone()))?;
        Ok(BedView::at(bed, Utc::now()))
    }

    pub fn admit(&self, request: AdmitRequest) -> BedResult<Admission> {
        self.coordinator.admit(request)
    }

    pub fn discharge(
        &self,
        bed_id: &BedId,
        discharged_at: Option<DateTime<Utc>>,
    ) -> BedResult<Admission> {
        self.coordinator.discharge(bed_id, discharged_at)
    }

    /// Records completion of a clinical form for the bed's current admission.
    ///
    /// Only the named form entry is written; concurrent TAT or other form updates are kept.
    ///
    /// # Errors
    ///
    /// - [`BedError::UnknownFormKey`] if the key is not in the configured catalogue.
    /// - [`BedError::BedNotOccupied`] if the bed is vacant, or the admission changed while the
    ///   update was in flight.
    pub fn update_bed_form_flag(
        &self,
        bed_id: &BedId,
        form_key: &str,
        submitted: bool,
        payload: Option<serde_json::Value>,
    ) -> BedResult<BedView> {
        let key = self.config.form_catalogue().recognise(form_key)?;
        let bed = self.get_bed(bed_id)?.bed;
        let Some(admission_id) = bed.active_admission_id() else {
            return Err(BedError::BedNotOccupied(bed_id.clone()));
        };

        let now = Utc::now();
        let patch = BedPatch::form(
            key.clone(),
            FormEntry {
                submitted,
                payload,
                updated_at: now,
            },
        );
        let bed = match self
            .beds
            .update_bed(bed_id, &patch, BedCondition::OccupiedBy(admission_id))?
        {
            Some(BedUpdate::Applied(bed)) => bed,
            Some(BedUpdate::Rejected(current)) => {
                tracing::warn!(
                    "form {} on bed {} rejected: admission changed (revision {})",
                    key,
                    bed_id,
                    current.revision
                );
                return Err(BedError::BedNotOccupied(bed_id.clone()));
            }
            None => return Err(BedError::BedNotFound(bed_id.clone())),
        };
        tracing::info!(
            "form {} on bed {} marked {}",
            key,
            bed_id,
            if submitted { "submitted" } else { "not submitted" }
        );
        Ok(BedView::at(bed, now))
    }

    /// Starts the TAT countdown of an occupied bed.
    pub fn start_tat(&self, bed_id: &BedId) -> BedResult<BedView> {
        self.transition_tat(bed_id, TatStatus::Idle, TatStatus::Running, TatTimer::start)
    }

    /// Stops a running countdown. A countdown past its deadline is recorded as `EXPIRED`.
    pub fn stop_tat(&self, bed_id: &BedId) -> BedResult<BedView> {
        self.transition_tat(bed_id, TatStatus::Running, TatStatus::Completed, TatTimer::stop)
    }

    fn transition_tat(
        &self,
        bed_id: &BedId,
        from: TatStatus,
        to: TatStatus,
        transition: fn(&TatState, DateTime<Utc>) -> BedResult<TatState>,
    ) -> BedResult<BedView> {
        let bed = self.get_bed(bed_id)?.bed;
        let Some(admission_id) = bed.active_admission_id() else {
            return Err(BedError::BedNotOccupied(bed_id.clone()));
        };

        let now = Utc::now();
        let patch = BedPatch::tat(transition(&bed.tat, now)?);
        let condition = BedCondition::OccupiedWithTat {
            admission_id,
            tat_status: from,
        };
        match self.beds.update_bed(bed_id, &patch, condition)? {
            Some(BedUpdate::Applied(bed)) => {
                tracing::info!("TAT on bed {} is now {}", bed_id, bed.tat.status);
                Ok(BedView::at(bed, now))
            }
            Some(BedUpdate::Rejected(current))
                if current.active_admission_id() == Some(admission_id) =>
            {
                Err(BedError::InvalidTatTransition {
                    from: current.tat.status,
                    to,
                })
            }
            Some(BedUpdate::Rejected(_)) => Err(BedError::BedNotOccupied(bed_id.clone())),
            None => Err(BedError::BedNotFound(bed_id.clone())),
        }
    }

    /// Registers a bed change observer.
    pub fn subscribe_bed_changes<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&BedEvent) -> Delivery + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe_bed_changes(&self, handle: SubscriptionHandle) -> bool {
        self.notifier.unsubscribe(handle)
    }

    pub fn check_consistency(&self) -> BedResult<ConsistencyReport> {
        self.coordinator.check_consistency()
    }

    /// Admission records, newest first, optionally filtered by status.
    pub fn list_admissions(&self, status: Option<AdmissionStatus>) -> BedResult<Vec<Admission>> {
        let mut admissions: Vec<Admission> = self
            .admissions
            .list_admissions()?
            .into_iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .collect();
        admissions.sort_by(|a, b| {
            b.admitted_at
                .cmp(&a.admitted_at)
                .then_with(|| b.number.cmp(&a.number))
        });
        Ok(admissions)
    }

    pub fn get_admission(&self, id: AdmissionId) -> BedResult<Admission> {
        self.admissions
            .get_admission(id)?
            .ok_or(BedError::AdmissionNotFound(id))
    }

    /// Last admission counter issued for `day_key` (0 when none).
    pub fn current_admission_counter(&self, day_key: DayKey) -> BedResult<u64> {
        self.issuer.current_counter(day_key)
    }

    /// Creates every inventory bed missing from the store as `VACANT`.
    pub fn seed_inventory(&self, inventory: Vec<InventoryBed>) -> BedResult<SeedReport> {
        let now = Utc::now();
        let mut report = SeedReport::default();
        for entry in inventory {
            let bed_id = entry.bed_id.clone();
            let bed = entry.into_vacant_bed(self.config.tat_duration_secs(), now);
            if self.beds.create_bed(&bed)? {
                report.created.push(bed_id);
            } else {
                report.skipped.push(bed_id);
            }
        }
        tracing::info!(
            "seeded bed inventory: {} created, {} already present",
            report.created.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Flushes the durable store, if any.
    pub fn flush(&self) -> BedResult<()> {
        if let Some(store) = &self.durable {
            store.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Department, PatientId};
    use crate::inventory::BedInventory;
    use crate::model::FormCatalogue;
    use crate::notifier::BedChangeKind;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir) -> BedBoardService {
        let config = CoreConfig::new(
            temp_dir.path().to_path_buf(),
            1800,
            FixedOffset::east_opt(0).unwrap(),
            FormCatalogue::builtin(),
        )
        .unwrap();
        let service = BedBoardService::open(config).unwrap();
        service
            .seed_inventory(
                BedInventory::parse(
                    "beds:\n  - bed_id: B5\n    room_type: General Ward\n  - bed_id: B6\n    room_type: Private\n    daily_rate: 450000\n",
                )
                .unwrap(),
            )
            .unwrap();
        service
    }

    fn admit(service: &BedBoardService, bed: &str, patient: &str) -> Admission {
        service
            .admit(AdmitRequest {
                bed_id: BedId::parse(bed).unwrap(),
                patient_id: PatientId::parse(patient).unwrap(),
                department: Department::parse("Surgery").unwrap(),
                admitted_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            })
            .unwrap()
    }

    fn b5() -> BedId {
        BedId::parse("B5").unwrap()
    }

    #[test]
    fn seeding_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let report = service
            .seed_inventory(
                BedInventory::parse(
                    "beds:\n  - bed_id: B5\n    room_type: ICU\n  - bed_id: B7\n    room_type: ICU\n",
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(report.created, vec![BedId::parse("B7").unwrap()]);
        assert_eq!(report.skipped, vec![b5()]);

        let b5 = service.get_bed(&b5()).unwrap();
        assert_eq!(b5.bed.room.room_type, "General Ward");
        assert_eq!(service.list_beds().unwrap().len(), 3);
    }

    #[test]
    fn form_flags_require_an_occupied_bed_and_known_key() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        assert!(matches!(
            service.update_bed_form_flag(&b5(), "admission_consent", true, None),
            Err(BedError::BedNotOccupied(_))
        ));

        admit(&service, "B5", "P");
        assert!(matches!(
            service.update_bed_form_flag(&b5(), "discharge_summary", true, None),
            Err(BedError::UnknownFormKey(_))
        ));

        let view = service
            .update_bed_form_flag(
                &b5(),
                "anaesthesia_consent",
                true,
                Some(serde_json::json!({ "asa_grade": 2 })),
            )
            .unwrap();
        let key = crate::model::FormKey::parse("anaesthesia_consent").unwrap();
        assert!(view.bed.form_submitted(&key));
        assert_eq!(
            view.bed.forms[&key].payload,
            Some(serde_json::json!({ "asa_grade": 2 }))
        );
    }

    #[test]
    fn form_and_tat_updates_do_not_clobber_each_other() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);
        admit(&service, "B5", "P");

        std::thread::scope(|scope| {
            let forms = service.clone();
            scope.spawn(move || {
                for key in ["admission_consent", "initial_assessment", "nursing_assessment"] {
                    forms.update_bed_form_flag(&b5(), key, true, None).unwrap();
                }
            });
            let tat = service.clone();
            scope.spawn(move || {
                tat.start_tat(&b5()).unwrap();
            });
        });

        let view = service.get_bed(&b5()).unwrap();
        assert_eq!(view.bed.tat.status, TatStatus::Running);
        assert_eq!(view.bed.forms.len(), 3);
        assert!(view.bed.forms.values().all(|entry| entry.submitted));
    }

    #[test]
    fn tat_lifecycle_through_service() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        assert!(matches!(
            service.start_tat(&b5()),
            Err(BedError::BedNotOccupied(_))
        ));

        admit(&service, "B5", "P");
        let started = service.start_tat(&b5()).unwrap();
        assert_eq!(started.tat.status, TatStatus::Running);
        assert!(started.tat.remaining_secs <= 1800);

        assert!(matches!(
            service.start_tat(&b5()),
            Err(BedError::InvalidTatTransition { .. })
        ));

        let stopped = service.stop_tat(&b5()).unwrap();
        assert_eq!(stopped.tat.status, TatStatus::Completed);

        service.discharge(&b5(), None).unwrap();
        let view = service.get_bed(&b5()).unwrap();
        assert_eq!(view.tat.status, TatStatus::Idle);
        assert_eq!(view.tat.remaining_secs, 1800);
    }

    #[test]
    fn subscribers_observe_every_bed_mutation() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handle = service.subscribe_bed_changes(move |event| {
            sink.lock()
                .unwrap()
                .push((event.kind, event.bed.status(), event.bed.revision));
            Delivery::Delivered
        });

        admit(&service, "B5", "P");
        service
            .update_bed_form_flag(&b5(), "admission_consent", true, None)
            .unwrap();
        service.discharge(&b5(), None).unwrap();

        assert!(service.unsubscribe_bed_changes(handle));
        admit(&service, "B5", "Q");

        use crate::model::BedStatus::{Occupied, Vacant};
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                (BedChangeKind::Updated, Occupied, 1),
                (BedChangeKind::Updated, Occupied, 2),
                (BedChangeKind::Updated, Vacant, 3),
            ]
        );
    }

    #[test]
    fn admissions_are_listed_newest_first() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let first = admit(&service, "B5", "P");
        let second = admit(&service, "B6", "Q");
        service.discharge(&b5(), None).unwrap();

        let all = service.list_admissions(None).unwrap();
        assert_eq!(
            all.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let active = service
            .list_admissions(Some(AdmissionStatus::Admitted))
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].number.to_string(), "IPD-20240301-002");

        assert_eq!(
            service.get_admission(first.id).unwrap().status,
            AdmissionStatus::Discharged
        );
        assert!(matches!(
            service.get_admission(AdmissionId::new()),
            Err(BedError::AdmissionNotFound(_))
        ));
        assert_eq!(
            service
                .current_admission_counter(DayKey::parse("20240301").unwrap())
                .unwrap(),
            2
        );
        assert!(service.check_consistency().unwrap().is_consistent());
    }
}
