use crate::error::{BedError, BedResult};
use crate::ids::{AdmissionId, BedId, Department, PatientId};
use crate::sequence::AdmissionNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an admission.
///
/// `ROLLED_BACK` marks a record whose admit call failed after the record was written; it never
/// counts as an active admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
    RolledBack,
}

impl AdmissionStatus {
    pub fn parse(input: &str) -> BedResult<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "ADMITTED" => Ok(Self::Admitted),
            "DISCHARGED" => Ok(Self::Discharged),
            "ROLLED_BACK" => Ok(Self::RolledBack),
            other => Err(BedError::InvalidInput(format!(
                "unknown admission status: '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "ADMITTED",
            Self::Discharged => "DISCHARGED",
            Self::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one in-patient admission. Never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub id: AdmissionId,
    pub number: AdmissionNumber,
    pub patient_id: PatientId,
    pub bed_id: BedId,
    /// Bed number at the time of admission.
    pub bed_number: String,
    pub room_type: String,
    pub department: Department,
    pub admitted_at: DateTime<Utc>,
    #[serde(default)]
    pub discharged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub status: AdmissionStatus,
}

impl Admission {
    pub fn is_active(&self) -> bool {
        self.status == AdmissionStatus::Admitted
    }
}

/// A status change applied to an `ADMITTED` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionTransition {
    Discharge { at: DateTime<Utc> },
    RollBack { at: DateTime<Utc> },
}

impl AdmissionTransition {
    pub fn target(&self) -> AdmissionStatus {
        match self {
            Self::Discharge { .. } => AdmissionStatus::Discharged,
            Self::RollBack { .. } => AdmissionStatus::RolledBack,
        }
    }

    /// Applies the transition if `admission` is still `ADMITTED`; returns false otherwise.
    pub fn apply_to(&self, admission: &mut Admission) -> bool {
        if !admission.is_active() {
            return false;
        }
        match *self {
            Self::Discharge { at } => admission.discharged_at = Some(at),
            Self::RollBack { at } => admission.rolled_back_at = Some(at),
        }
        admission.status = self.target();
        true
    }
}
