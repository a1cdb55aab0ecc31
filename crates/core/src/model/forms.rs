//! Clinical documentation flags carried by an occupied bed.
//!
//! The set of recognised form keys belongs to the clinical-forms collaborator. The core only
//! stores a submitted flag and an opaque JSON payload per key, and refuses keys the configured
//! [`FormCatalogue`] does not know about.

use crate::constants::DEFAULT_FORM_KEYS;
use crate::error::{BedError, BedResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Slug identifying a clinical form, e.g. `anaesthesia_consent`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormKey(String);

impl FormKey {
    pub fn parse(input: &str) -> BedResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty()
            || !trimmed
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(BedError::InvalidInput(format!(
                "form key must be a lowercase slug ([a-z0-9_]), got: '{input}'"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FormKey {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FormKey::parse(&value)
    }
}

impl From<FormKey> for String {
    fn from(value: FormKey) -> Self {
        value.0
    }
}

/// Completion state of one form for the current admission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormEntry {
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// The set of form keys this deployment recognises.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormCatalogue {
    keys: BTreeSet<FormKey>,
}

impl FormCatalogue {
    /// # Errors
    ///
    /// Returns [`BedError::InvalidInput`] if `keys` is empty.
    pub fn new(keys: impl IntoIterator<Item = FormKey>) -> BedResult<Self> {
        let keys: BTreeSet<FormKey> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(BedError::InvalidInput(
                "form catalogue must contain at least one key".into(),
            ));
        }
        Ok(Self { keys })
    }

    /// Catalogue shipped with the clinical-forms module.
    pub fn builtin() -> Self {
        Self {
            keys: DEFAULT_FORM_KEYS
                .iter()
                .map(|key| FormKey((*key).to_owned()))
                .collect(),
        }
    }

    /// Resolves a caller-supplied key against the catalogue.
    pub fn recognise(&self, input: &str) -> BedResult<FormKey> {
        let key = FormKey::parse(input)?;
        if !self.keys.contains(&key) {
            return Err(BedError::UnknownFormKey(key.0));
        }
        Ok(key)
    }

    pub fn contains(&self, key: &FormKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FormKey> {
        self.keys.iter()
    }
}
