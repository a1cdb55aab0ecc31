use crate::ids::{AdmissionId, BedId};
use crate::model::AdmissionStatus;
use crate::sequence::{AdmissionNumber, DayKey};
use crate::tat::TatStatus;

/// Failures raised by a store implementation.
///
/// These are transport/persistence failures. Business rule violations never appear here; the
/// store reports a failed write condition through its return value instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("counter row for {0} is corrupt")]
    CorruptCounter(String),
    #[error("record already exists: {0}")]
    DuplicateKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Coarse classification used by callers to decide how to present and whether to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request conflicts with current state; nothing was mutated.
    Validation,
    /// The daily counter could not be advanced; nothing was written.
    Sequence,
    /// Records may disagree; operator reconciliation may be needed.
    PartialFailure,
    /// Transport or persistence failure; the caller decides whether to retry.
    StoreUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum BedError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("bed not found: {0}")]
    BedNotFound(BedId),
    #[error("admission not found: {0}")]
    AdmissionNotFound(AdmissionId),
    #[error("bed {0} is not available")]
    BedNotAvailable(BedId),
    #[error("bed {0} is not occupied")]
    BedNotOccupied(BedId),
    #[error("admission {admission_id} is {status:?}, expected it to be active")]
    AdmissionNotActive {
        admission_id: AdmissionId,
        status: AdmissionStatus,
    },
    #[error("could not issue an admission number for {day_key}: {source}")]
    SequenceUnavailable { day_key: DayKey, source: StoreError },
    #[error(
        "admission {admission_number} ({admission_id}) for bed {bed_id} partially completed: {source}; compensation {}",
        compensation_outcome(.compensation_error)
    )]
    PartialAdmissionFailure {
        bed_id: BedId,
        admission_id: AdmissionId,
        admission_number: AdmissionNumber,
        source: Box<BedError>,
        compensation_error: Option<Box<BedError>>,
    },
    #[error(
        "admission {admission_id} was discharged but bed {bed_id} could not be released: {source}"
    )]
    PartialDischargeFailure {
        bed_id: BedId,
        admission_id: AdmissionId,
        source: Box<BedError>,
    },
    #[error("TAT countdown cannot move from {from:?} to {to:?}")]
    InvalidTatTransition { from: TatStatus, to: TatStatus },
    #[error("unknown form key: {0}")]
    UnknownFormKey(String),
    #[error("invalid bed inventory: {0}")]
    InventoryParse(String),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// A mutation whose result was not observed; it may still have been applied.
    #[error("outcome of {operation} on bed {bed_id} unknown: {reason}")]
    OutcomeUnknown {
        operation: &'static str,
        bed_id: BedId,
        reason: String,
    },
}

pub type BedResult<T> = std::result::Result<T, BedError>;

impl BedError {
    /// Classify this error for presentation and retry decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BedError::SequenceUnavailable { .. } => ErrorCategory::Sequence,
            BedError::PartialAdmissionFailure { .. }
            | BedError::PartialDischargeFailure { .. }
            | BedError::OutcomeUnknown { .. } => ErrorCategory::PartialFailure,
            BedError::Store(_) | BedError::StoreUnavailable(_) | BedError::FileRead(_) => {
                ErrorCategory::StoreUnavailable
            }
            BedError::InvalidInput(_)
            | BedError::BedNotFound(_)
            | BedError::AdmissionNotFound(_)
            | BedError::BedNotAvailable(_)
            | BedError::BedNotOccupied(_)
            | BedError::AdmissionNotActive { .. }
            | BedError::InvalidTatTransition { .. }
            | BedError::UnknownFormKey(_)
            | BedError::InventoryParse(_) => ErrorCategory::Validation,
        }
    }
}

fn compensation_outcome(compensation_error: &Option<Box<BedError>>) -> String {
    match compensation_error {
        Some(err) => format!("failed ({err})"),
        None => "applied".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_admission_failure_reports_compensation_outcome() {
        let bed_id = BedId::parse("B5").unwrap();
        let number: AdmissionNumber = "IPD-20240301-001".parse().unwrap();

        let compensated = BedError::PartialAdmissionFailure {
            bed_id: bed_id.clone(),
            admission_id: AdmissionId::new(),
            admission_number: number.clone(),
            source: Box::new(BedError::StoreUnavailable("disk full".into())),
            compensation_error: None,
        };
        assert!(compensated.to_string().contains("compensation applied"));
        assert_eq!(compensated.category(), ErrorCategory::PartialFailure);

        let uncompensated = BedError::PartialAdmissionFailure {
            bed_id,
            admission_id: AdmissionId::new(),
            admission_number: number,
            source: Box::new(BedError::StoreUnavailable("disk full".into())),
            compensation_error: Some(Box::new(BedError::StoreUnavailable("still full".into()))),
        };
        let message = uncompensated.to_string();
        assert!(message.contains("compensation failed"));
        assert!(message.contains("still full"));
    }

    #[test]
    fn categories_follow_taxonomy() {
        let bed_id = BedId::parse("B1").unwrap();
        assert_eq!(
            BedError::BedNotAvailable(bed_id.clone()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            BedError::BedNotOccupied(bed_id.clone()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            BedError::OutcomeUnknown {
                operation: "admit",
                bed_id,
                reason: "no reply within 100 ms".into(),
            }
            .category(),
            ErrorCategory::PartialFailure
        );
        assert_eq!(
            BedError::SequenceUnavailable {
                day_key: "20240301".parse().unwrap(),
                source: StoreError::Unavailable("down".into()),
            }
            .category(),
            ErrorCategory::Sequence
        );
        assert_eq!(
            BedError::Store(StoreError::Unavailable("down".into())).category(),
            ErrorCategory::StoreUnavailable
        );
    }
}
