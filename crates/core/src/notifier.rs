//! Publish/subscribe fan-out of bed changes.
//!
//! Every successful bed mutation is delivered to every subscriber registered at publish time.
//! Delivery is synchronous and outside the registry lock, so a subscriber may subscribe or
//! unsubscribe from inside its own callback. A subscriber stays registered until it is
//! unsubscribed or its callback reports [`Delivery::Disconnected`]; a panicking callback is
//! logged and kept. Nothing is buffered for subscribers that join later: they re-read current
//! state and rely on the bed `revision` to discard stale or duplicate events.

use crate::error::StoreResult;
use crate::ids::{AdmissionId, BedId};
use crate::model::{Admission, AdmissionTransition, Bed};
use crate::store::{
    BedAdmissionTransactions, BedCondition, BedPatch, BedStore, BedUpdate, LinkedDischarge,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedChangeKind {
    Created,
    Updated,
}

impl fmt::Display for BedChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BedChangeKind::Created => "CREATED",
            BedChangeKind::Updated => "UPDATED",
        })
    }
}

/// A bed record as stored immediately after a mutation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BedEvent {
    pub kind: BedChangeKind,
    pub bed: Bed,
    pub emitted_at: DateTime<Utc>,
}

/// Outcome reported by a subscriber callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The subscriber has gone away and should be dropped.
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback = Arc<dyn Fn(&BedEvent) -> Delivery + Send + Sync>;

#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriptionHandle, Callback>>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&BedEvent) -> Delivery + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(handle, Arc::new(callback));
        tracing::debug!("bed change subscriber {} registered", handle);
        handle
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle)
            .is_some();
        if removed {
            tracing::debug!("bed change subscriber {} removed", handle);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Delivers `event` to every current subscriber. Returns the number of deliveries.
    pub fn publish(&self, event: &BedEvent) -> usize {
        let snapshot: Vec<(SubscriptionHandle, Callback)> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(handle, callback)| (*handle, Arc::clone(callback)))
            .collect();

        let mut delivered = 0;
        let mut disconnected = Vec::new();
        for (handle, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::Disconnected) => disconnected.push(handle),
                Err(_) => {
                    tracing::warn!(
                        "bed change subscriber {} panicked handling bed {}",
                        handle,
                        event.bed.bed_id
                    );
                }
            }
        }

        for handle in disconnected {
            self.unsubscribe(handle);
        }
        delivered
    }
}

/// [`BedStore`] decorator publishing every applied mutation.
pub struct NotifyingBedStore {
    inner: Arc<dyn BedStore>,
    notifier: Arc<ChangeNotifier>,
}

impl NotifyingBedStore {
    pub fn new(inner: Arc<dyn BedStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { inner, notifier }
    }

    fn emit(&self, kind: BedChangeKind, bed: &Bed) {
        self.notifier.publish(&BedEvent {
            kind,
            bed: bed.clone(),
            emitted_at: Utc::now(),
        });
    }
}

impl BedStore for NotifyingBedStore {
    fn create_bed(&self, bed: &Bed) -> StoreResult<bool> {
        let created = self.inner.create_bed(bed)?;
        if created {
            self.emit(BedChangeKind::Created, bed);
        }
        Ok(created)
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
        let update = self.inner.update_bed(bed_id, patch, condition)?;
        if let Some(BedUpdate::Applied(bed)) = &update {
            self.emit(BedChangeKind::Updated, bed);
        }
        Ok(update)
    }
}

/// [`BedAdmissionTransactions`] decorator publishing the bed of every committed transaction.
pub struct NotifyingTransactions {
    inner: Arc<dyn BedAdmissionTransactions>,
    notifier: Arc<ChangeNotifier>,
}

impl NotifyingTransactions {
    pub fn new(inner: Arc<dyn BedAdmissionTransactions>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { inner, notifier }
    }

    fn emit(&self, bed: &Bed) {
        self.notifier.publish(&BedEvent {
            kind: BedChangeKind::Updated,
            bed: bed.clone(),
            emitted_at: Utc::now(),
        });
    }
}

impl BedAdmissionTransactions for NotifyingTransactions {
    fn admit_with_bed(
        &self,
        admission: &Admission,
        patch: &BedPatch,
    ) -> StoreResult<Option<BedUpdate>> {
        let update = self.inner.admit_with_bed(admission, patch)?;
        if let Some(BedUpdate::Applied(bed)) = &update {
            self.emit(bed);
        }
        Ok(update)
    }

    fn discharge_with_bed(
        &self,
        bed_id: &BedId,
        admission_id: AdmissionId,
        transition: AdmissionTransition,
        patch: &BedPatch,
    ) -> StoreResult<LinkedDischarge> {
        let outcome = self
            .inner
            .discharge_with_bed(bed_id, admission_id, transition, patch)?;
        if let LinkedDischarge::Applied { bed, .. } = &outcome {
            self.emit(bed);
        }
        Ok(outcome)
    }
}
