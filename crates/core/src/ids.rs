//! Identifier types.
//!
//! Every identifier crossing the core boundary is validated once at construction so the rest of
//! the crate can rely on its shape:
//!
//! - [`AdmissionId`]: canonical UUID, **32 lowercase hexadecimal characters** with no hyphens.
//!   This is the same value `Uuid::new_v4().simple().to_string()` produces. Hyphenated or
//!   uppercase forms are rejected rather than normalised.
//! - [`BedId`]: stable bed identifier from the hospital inventory (`[A-Za-z0-9_-]`, at most
//!   32 characters), also used as the store key.
//! - [`PatientId`]: opaque identifier owned by the patient registry. The core trusts that it
//!   refers to a real patient and only checks that it is printable and bounded.
//! - [`Department`]: free-text department name, trimmed and non-empty.

use crate::constants::{MAX_BED_ID_LEN, MAX_PATIENT_ID_LEN};
use crate::error::{BedError, BedResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Durable identifier of an admission record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdmissionId(Uuid);

impl Default for AdmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionId {
    /// Allocates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates an identifier that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`BedError::InvalidInput`] if `input` is not 32 lowercase hex characters.
    pub fn parse(input: &str) -> BedResult<Self> {
        if Self::is_canonical(input) {
            let uuid = Uuid::parse_str(input).map_err(|e| {
                BedError::InvalidInput(format!("invalid admission id '{input}': {e}"))
            })?;
            return Ok(Self(uuid));
        }
        Err(BedError::InvalidInput(format!(
            "admission id must be 32 lowercase hex characters without hyphens, got: '{input}'"
        )))
    }

    /// Returns true if `input` is in canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Store key for this identifier.
    pub fn as_key(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl fmt::Display for AdmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for AdmissionId {
    type Err = BedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdmissionId::parse(s)
    }
}

impl TryFrom<String> for AdmissionId {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AdmissionId::parse(&value)
    }
}

impl From<AdmissionId> for String {
    fn from(value: AdmissionId) -> Self {
        value.to_string()
    }
}

/// Stable identifier of a physical bed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BedId(String);

impl BedId {
    pub fn parse(input: &str) -> BedResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_BED_ID_LEN {
            return Err(BedError::InvalidInput(format!(
                "bed id must be 1 to {MAX_BED_ID_LEN} characters, got: '{input}'"
            )));
        }
        if !trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(BedError::InvalidInput(format!(
                "bed id may only contain letters, digits, '-' and '_', got: '{input}'"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BedId {
    type Err = BedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BedId::parse(s)
    }
}

impl TryFrom<String> for BedId {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BedId::parse(&value)
    }
}

impl From<BedId> for String {
    fn from(value: BedId) -> Self {
        value.0
    }
}

/// Identifier of the occupying patient, owned by the patient registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientId(String);

impl PatientId {
    pub fn parse(input: &str) -> BedResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_PATIENT_ID_LEN {
            return Err(BedError::InvalidInput(format!(
                "patient id must be 1 to {MAX_PATIENT_ID_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(BedError::InvalidInput(
                "patient id must not contain control characters".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PatientId {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PatientId::parse(&value)
    }
}

impl From<PatientId> for String {
    fn from(value: PatientId) -> Self {
        value.0
    }
}

/// Department the patient is admitted under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Department(String);

impl Department {
    pub fn parse(input: &str) -> BedResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BedError::InvalidInput("department cannot be empty".into()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Department {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Department::parse(&value)
    }
}

impl From<Department> for String {
    fn from(value: Department) -> Self {
        value.0
    }
}
