use super::forms::{FormEntry, FormKey};
use crate::ids::{AdmissionId, BedId, PatientId};
use crate::tat::TatState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedStatus {
    Vacant,
    Occupied,
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BedStatus::Vacant => "VACANT",
            BedStatus::Occupied => "OCCUPIED",
        })
    }
}

/// Occupancy of a bed.
///
/// Patient and active admission exist only together with the `OCCUPIED` status, so the
/// "occupied iff admission set iff patient set" rule cannot be violated by construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Occupancy {
    Vacant,
    Occupied {
        patient_id: PatientId,
        admission_id: AdmissionId,
    },
}

impl Occupancy {
    pub fn status(&self) -> BedStatus {
        match self {
            Occupancy::Vacant => BedStatus::Vacant,
            Occupancy::Occupied { .. } => BedStatus::Occupied,
        }
    }

    pub fn patient_id(&self) -> Option<&PatientId> {
        match self {
            Occupancy::Vacant => None,
            Occupancy::Occupied { patient_id, .. } => Some(patient_id),
        }
    }

    pub fn admission_id(&self) -> Option<AdmissionId> {
        match self {
            Occupancy::Vacant => None,
            Occupancy::Occupied { admission_id, .. } => Some(*admission_id),
        }
    }
}

/// Room classification and tariff. Owned by billing; read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_type: String,
    /// Daily rate in minor currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_rate: Option<u64>,
}

/// A physical bed and its bed-side state for the current admission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub bed_id: BedId,
    pub bed_number: String,
    pub room: RoomInfo,
    pub occupancy: Occupancy,
    pub tat: TatState,
    #[serde(default)]
    pub forms: BTreeMap<FormKey, FormEntry>,
    /// Incremented by the store on every applied mutation.
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl Bed {
    pub fn vacant(
        bed_id: BedId,
        bed_number: String,
        room: RoomInfo,
        tat_duration_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bed_id,
            bed_number,
            room,
            occupancy: Occupancy::Vacant,
            tat: TatState::idle(tat_duration_secs),
            forms: BTreeMap::new(),
            revision: 0,
            updated_at: now,
        }
    }

    pub fn status(&self) -> BedStatus {
        self.occupancy.status()
    }

    pub fn is_vacant(&self) -> bool {
        matches!(self.occupancy, Occupancy::Vacant)
    }

    pub fn active_admission_id(&self) -> Option<AdmissionId> {
        self.occupancy.admission_id()
    }

    /// True if `key` is marked submitted for the current admission.
    pub fn form_submitted(&self, key: &FormKey) -> bool {
        self.forms.get(key).is_some_and(|entry| entry.submitted)
    }
}

/// Bed board order: bed numbers compared with embedded digit runs taken numerically
/// (`W2` before `W10`), then bed id.
pub fn bed_board_order(a: &Bed, b: &Bed) -> Ordering {
    natural_cmp(&a.bed_number, &b.bed_number).then_with(|| a.bed_id.cmp(&b.bed_id))
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let l_trim = l_run.trim_start_matches('0');
                let r_trim = r_run.trim_start_matches('0');
                let ordering = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim))
                    .then_with(|| l_run.len().cmp(&r_run.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l
                    .to_ascii_lowercase()
                    .cmp(&r.to_ascii_lowercase())
                    .then_with(|| l.cmp(&r));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bed(id: &str, number: &str) -> Bed {
        Bed::vacant(
            BedId::parse(id).unwrap(),
            number.into(),
            RoomInfo {
                room_type: "General Ward".into(),
                daily_rate: None,
            },
            1800,
            Utc::now(),
        )
    }

    #[test]
    fn bed_board_uses_natural_number_order() {
        let mut beds = vec![
            bed("b10", "W-10"),
            bed("b2", "W-2"),
            bed("icu1", "ICU-1"),
            bed("b1", "W-1"),
        ];
        beds.sort_by(bed_board_order);
        let numbers: Vec<&str> = beds.iter().map(|b| b.bed_number.as_str()).collect();
        assert_eq!(numbers, vec!["ICU-1", "W-1", "W-2", "W-10"]);
    }

    #[test]
    fn occupancy_serialises_with_status_tag() {
        let occupied = Occupancy::Occupied {
            patient_id: PatientId::parse("P-1").unwrap(),
            admission_id: AdmissionId::parse("550e8400e29b41d4a716446655440000").unwrap(),
        };
        let json = serde_json::to_value(&occupied).unwrap();
        assert_eq!(json["status"], "OCCUPIED");
        assert_eq!(json["patient_id"], "P-1");

        let vacant = serde_json::to_value(Occupancy::Vacant).unwrap();
        assert_eq!(vacant, serde_json::json!({ "status": "VACANT" }));
    }

    #[test]
    fn vacant_bed_has_no_patient_or_admission() {
        let bed = bed("b1", "W-1");
        assert!(bed.is_vacant());
        assert_eq!(bed.status(), BedStatus::Vacant);
        assert_eq!(bed.active_admission_id(), None);
        assert_eq!(bed.occupancy.patient_id(), None);
        assert!(bed.forms.is_empty());
    }
}
