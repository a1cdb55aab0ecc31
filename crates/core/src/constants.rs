//! Constants used throughout the bedboard core crate.
//!
//! Storage names, identifier formats and defaults live here so the store, the sequence issuer
//! and the runtime configuration agree on them.

/// Default directory for the durable store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "bed_data";

/// Default TAT countdown window in seconds.
pub const DEFAULT_TAT_SECONDS: u64 = 1800;

/// Default bound on a single store round-trip issued by an API surface, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

/// Prefix of every rendered admission number.
pub const ADMISSION_NUMBER_PREFIX: &str = "IPD";

/// Minimum zero-padded width of the daily counter in a rendered admission number.
pub const ADMISSION_COUNTER_WIDTH: usize = 3;

/// Store tree holding one record per physical bed.
pub const BEDS_TREE: &str = "beds";

/// Store tree holding one record per admission.
pub const ADMISSIONS_TREE: &str = "admissions";

/// Store tree holding one counter row per day key.
pub const SEQUENCE_TREE: &str = "admission_sequence";

/// Maximum length of a bed identifier.
pub const MAX_BED_ID_LEN: usize = 32;

/// Maximum length of an externally supplied patient identifier.
pub const MAX_PATIENT_ID_LEN: usize = 64;

/// Form keys recognised when no catalogue is configured.
pub const DEFAULT_FORM_KEYS: &[&str] = &[
    "admission_consent",
    "anaesthesia_consent",
    "high_risk_consent",
    "surgical_safety_checklist",
    "initial_assessment",
    "nursing_assessment",
];
