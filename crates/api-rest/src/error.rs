use axum::http::StatusCode;
use bedboard_core::{BedError, ErrorCategory};

/// Map a core error onto an HTTP status and a short user-facing message.
///
/// Validation failures are logged at `warn`, everything else at `error`.
pub fn error_response(operation: &str, err: &BedError) -> (StatusCode, &'static str) {
    match err.category() {
        ErrorCategory::Validation => {
            tracing::warn!("{operation} rejected: {err}");
        }
        ErrorCategory::Sequence | ErrorCategory::StoreUnavailable => {
            tracing::error!("{operation} failed: {err:?}");
        }
        ErrorCategory::PartialFailure => {
            tracing::error!("{operation} partially completed, reconciliation needed: {err:?}");
        }
    }

    match err {
        BedError::BedNotFound(_) => (StatusCode::NOT_FOUND, "Bed not found"),
        BedError::AdmissionNotFound(_) => (StatusCode::NOT_FOUND, "Admission not found"),
        BedError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
        BedError::UnknownFormKey(_) => (StatusCode::BAD_REQUEST, "Unknown form key"),
        BedError::InventoryParse(_) => (StatusCode::BAD_REQUEST, "Invalid bed inventory"),
        BedError::BedNotAvailable(_) => {
            (StatusCode::CONFLICT, "Bed was just taken by someone else")
        }
        BedError::BedNotOccupied(_) => (StatusCode::CONFLICT, "Bed is not occupied"),
        BedError::AdmissionNotActive { .. } => (StatusCode::CONFLICT, "Admission is not active"),
        BedError::InvalidTatTransition { .. } => {
            (StatusCode::CONFLICT, "Countdown is not in the required state")
        }
        BedError::PartialAdmissionFailure { .. }
        | BedError::PartialDischargeFailure { .. }
        | BedError::OutcomeUnknown { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Operation partially completed, contact support",
        ),
        BedError::SequenceUnavailable { .. }
        | BedError::Store(_)
        | BedError::StoreUnavailable(_)
        | BedError::FileRead(_) => (StatusCode::SERVICE_UNAVAILABLE, "System error, please retry"),
    }
}
