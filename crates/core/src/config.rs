//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core services. Request
//! handling never reads process-wide environment variables.
//!
//! Each environment value has a `*_from_env_value` helper taking the raw `Option<String>` so
//! binaries and tests can resolve values without touching the process environment. Missing or
//! blank values fall back to the documented default.

use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TAT_SECONDS};
use crate::error::{BedError, BedResult};
use crate::model::{FormCatalogue, FormKey};
use chrono::FixedOffset;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    tat_duration_secs: u64,
    utc_offset: FixedOffset,
    form_catalogue: FormCatalogue,
}

impl CoreConfig {
    pub fn new(
        data_dir: PathBuf,
        tat_duration_secs: u64,
        utc_offset: FixedOffset,
        form_catalogue: FormCatalogue,
    ) -> BedResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(BedError::InvalidInput("data_dir cannot be empty".into()));
        }
        if tat_duration_secs == 0 {
            return Err(BedError::InvalidInput(
                "TAT duration must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            tat_duration_secs,
            utc_offset,
            form_catalogue,
        })
    }

    /// Directory of the durable store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Countdown duration given to every newly admitted bed.
    pub fn tat_duration_secs(&self) -> u64 {
        self.tat_duration_secs
    }

    /// Hospital wall-clock offset used to derive admission day keys.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn form_catalogue(&self) -> &FormCatalogue {
        &self.form_catalogue
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    non_blank(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn tat_duration_from_env_value(value: Option<String>) -> BedResult<u64> {
    let Some(value) = non_blank(value) else {
        return Ok(DEFAULT_TAT_SECONDS);
    };
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(BedError::InvalidInput(format!(
            "BEDBOARD_TAT_SECONDS must be a positive number of seconds, got: '{value}'"
        ))),
    }
}

const MAX_UTC_OFFSET_SECS: i32 = 14 * 3600;

/// Parse a fixed UTC offset written as `Z`, `+HH:MM` or `-HH:MM`, at most 14 hours from UTC.
pub fn utc_offset_from_env_value(value: Option<String>) -> BedResult<FixedOffset> {
    let invalid = |value: &str| {
        BedError::InvalidInput(format!(
            "BEDBOARD_UTC_OFFSET must look like +05:30, -04:00 or Z, got: '{value}'"
        ))
    };

    let Some(value) = non_blank(value) else {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid("+00:00"));
    };
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid(&value));
    }

    let offset: FixedOffset = value.parse().map_err(|_| invalid(&value))?;
    if offset.local_minus_utc().abs() > MAX_UTC_OFFSET_SECS {
        return Err(invalid(&value));
    }
    Ok(offset)
}

/// Parse a comma-separated list of form keys. Missing value yields the built-in catalogue.
pub fn form_catalogue_from_env_value(value: Option<String>) -> BedResult<FormCatalogue> {
    let Some(value) = non_blank(value) else {
        return Ok(FormCatalogue::builtin());
    };
    let keys = value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(FormKey::parse)
        .collect::<BedResult<Vec<_>>>()?;
    FormCatalogue::new(keys)
}

/// Bound on a single store round-trip issued by an API surface.
pub fn store_timeout_from_env_value(value: Option<String>) -> BedResult<Duration> {
    let Some(value) = non_blank(value) else {
        return Ok(Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
    };
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(BedError::InvalidInput(format!(
            "BEDBOARD_STORE_TIMEOUT_MS must be a positive number of milliseconds, got: '{value}'"
        ))),
    }
}

/// Optional path to a YAML bed inventory.
pub fn bed_inventory_from_env_value(value: Option<String>) -> Option<PathBuf> {
    non_blank(value).map(PathBuf::from)
}

/// Resolve `CoreConfig` from the `BEDBOARD_*` environment variables.
///
/// Intended to be called once from a binary's `main`.
pub fn core_config_from_env() -> BedResult<CoreConfig> {
    CoreConfig::new(
        data_dir_from_env_value(std::env::var("BEDBOARD_DATA_DIR").ok()),
        tat_duration_from_env_value(std::env::var("BEDBOARD_TAT_SECONDS").ok())?,
        utc_offset_from_env_value(std::env::var("BEDBOARD_UTC_OFFSET").ok())?,
        form_catalogue_from_env_value(std::env::var("BEDBOARD_FORM_KEYS").ok())?,
    )
}
