//! Daily admission numbering.
//!
//! Admission numbers are rendered as `IPD-<YYYYMMDD>-<NNN>`: the day key of the admission and a
//! per-day counter zero-padded to at least three digits (`IPD-20240301-001`, ...,
//! `IPD-20240301-1000`). The rendering is an external contract and must not change.
//!
//! The counter for a day key lives in a single store row and is only ever advanced through
//! [`SequenceStore::increment`], which the store performs as one atomic read-increment-write.
//! There is no fallback numbering path: if the counter cannot be advanced the admission is
//! refused with [`BedError::SequenceUnavailable`].

use crate::constants::{ADMISSION_COUNTER_WIDTH, ADMISSION_NUMBER_PREFIX};
use crate::error::{BedError, BedResult};
use crate::store::SequenceStore;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::{fmt, str::FromStr};

/// Calendar day scoping an admission counter, rendered as 8-digit `YYYYMMDD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Day key of `instant` on the hospital wall clock described by `offset`.
    pub fn from_instant(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self(instant.with_timezone(&offset).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn parse(input: &str) -> BedResult<Self> {
        if input.len() != 8 || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BedError::InvalidInput(format!(
                "day key must be 8 digits (YYYYMMDD), got: '{input}'"
            )));
        }
        NaiveDate::parse_from_str(input, "%Y%m%d")
            .map(Self)
            .map_err(|e| BedError::InvalidInput(format!("invalid day key '{input}': {e}")))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl FromStr for DayKey {
    type Err = BedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayKey::parse(s)
    }
}

impl TryFrom<String> for DayKey {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DayKey::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// An issued admission number. Immutable once assigned to an admission.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdmissionNumber {
    day_key: DayKey,
    counter: u64,
}

impl AdmissionNumber {
    pub fn new(day_key: DayKey, counter: u64) -> BedResult<Self> {
        if counter == 0 {
            return Err(BedError::InvalidInput(
                "admission counter starts at 1".into(),
            ));
        }
        Ok(Self { day_key, counter })
    }

    pub fn day_key(&self) -> DayKey {
        self.day_key
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Display for AdmissionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ADMISSION_NUMBER_PREFIX}-{}-{:0width$}",
            self.day_key,
            self.counter,
            width = ADMISSION_COUNTER_WIDTH
        )
    }
}

impl FromStr for AdmissionNumber {
    type Err = BedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BedError::InvalidInput(format!("invalid admission number: '{s}'"));

        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(day), Some(counter)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if prefix != ADMISSION_NUMBER_PREFIX
            || counter.len() < ADMISSION_COUNTER_WIDTH
            || !counter.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let counter: u64 = counter.parse().map_err(|_| invalid())?;
        AdmissionNumber::new(DayKey::parse(day)?, counter)
    }
}

impl TryFrom<String> for AdmissionNumber {
    type Error = BedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AdmissionNumber> for String {
    fn from(value: AdmissionNumber) -> Self {
        value.to_string()
    }
}

/// Issues admission numbers from the durable per-day counter.
#[derive(Clone)]
pub struct SequenceIssuer {
    store: Arc<dyn SequenceStore>,
}

impl SequenceIssuer {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self { store }
    }

    /// Issues the next admission number for `day_key`.
    ///
    /// Safe for any number of concurrent callers: every call observes a distinct counter value
    /// because the increment happens inside the store as a single atomic operation.
    ///
    /// # Errors
    ///
    /// Returns [`BedError::SequenceUnavailable`] if the store cannot advance the counter. The
    /// caller must not proceed with the admission in that case.
    pub fn next_admission_number(&self, day_key: DayKey) -> BedResult<AdmissionNumber> {
        let counter = self
            .store
            .increment(&day_key)
            .map_err(|source| {
                tracing::error!("admission counter for {} unavailable: {}", day_key, source);
                BedError::SequenceUnavailable { day_key, source }
            })?;

        AdmissionNumber::new(day_key, counter)
    }

    /// Last counter value issued for `day_key`, or 0 when none has been issued.
    pub fn current_counter(&self, day_key: DayKey) -> BedResult<u64> {
        Ok(self.store.current(&day_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SledStore;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn issuer(temp_dir: &TempDir) -> SequenceIssuer {
        let store = SledStore::open(temp_dir.path()).expect("open store");
        SequenceIssuer::new(Arc::new(store))
    }

    #[test]
    fn renders_bit_exact_format() {
        let day = DayKey::parse("20240301").unwrap();
        assert_eq!(
            AdmissionNumber::new(day, 1).unwrap().to_string(),
            "IPD-20240301-001"
        );
        assert_eq!(
            AdmissionNumber::new(day, 42).unwrap().to_string(),
            "IPD-20240301-042"
        );
        assert_eq!(
            AdmissionNumber::new(day, 1000).unwrap().to_string(),
            "IPD-20240301-1000"
        );
    }

    #[test]
    fn parses_rendered_numbers() {
        let number: AdmissionNumber = "IPD-20240301-1234".parse().unwrap();
        assert_eq!(number.counter(), 1234);
        assert_eq!(number.day_key().to_string(), "20240301");

        assert!("IPD-20240301-01".parse::<AdmissionNumber>().is_err());
        assert!("OPD-20240301-001".parse::<AdmissionNumber>().is_err());
        assert!("IPD-2024031-001".parse::<AdmissionNumber>().is_err());
        assert!("IPD-20240301-000".parse::<AdmissionNumber>().is_err());
    }

    #[test]
    fn day_key_rejects_malformed_input() {
        assert!(DayKey::parse("20240230").is_err());
        assert!(DayKey::parse("2024-03-01").is_err());
        assert!(DayKey::parse("240301").is_err());
    }

    #[test]
    fn day_key_follows_hospital_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 2, 29, 20, 0, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();

        assert_eq!(DayKey::from_instant(instant, utc).to_string(), "20240229");
        assert_eq!(DayKey::from_instant(instant, ist).to_string(), "20240301");
    }

    #[test]
    fn issues_strictly_increasing_numbers_per_day() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let issuer = issuer(&temp_dir);
        let day = DayKey::parse("20240301").unwrap();
        let other_day = DayKey::parse("20240302").unwrap();

        assert_eq!(issuer.current_counter(day).unwrap(), 0);

        let first = issuer.next_admission_number(day).unwrap();
        let second = issuer.next_admission_number(day).unwrap();
        let next_day = issuer.next_admission_number(other_day).unwrap();

        assert_eq!(first.to_string(), "IPD-20240301-001");
        assert_eq!(second.to_string(), "IPD-20240301-002");
        assert_eq!(next_day.to_string(), "IPD-20240302-001");
        assert_eq!(issuer.current_counter(day).unwrap(), 2);
    }

    #[test]
    fn concurrent_issuance_never_repeats_a_number() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let issuer = issuer(&temp_dir);
        let day = DayKey::parse("20240301").unwrap();

        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let issued: Vec<AdmissionNumber> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let issuer = issuer.clone();
                    scope.spawn(move || {
                        let mut numbers = Vec::with_capacity(PER_THREAD);
                        let mut last = 0;
                        for _ in 0..PER_THREAD {
                            let number = issuer.next_admission_number(day).expect("issue");
                            // Each caller sees its own values strictly increasing.
                            assert!(number.counter() > last);
                            last = number.counter();
                            numbers.push(number);
                        }
                        numbers
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("thread panicked"))
                .collect()
        });

        let distinct: HashSet<String> = issued.iter().map(ToString::to_string).collect();
        assert_eq!(distinct.len(), THREADS * PER_THREAD);
        assert_eq!(
            issuer.current_counter(day).unwrap(),
            (THREADS * PER_THREAD) as u64
        );
    }
}
