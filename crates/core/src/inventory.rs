//! Hospital bed inventory files.
//!
//! The inventory is fixed at hospital setup and described in YAML:
//!
//! ```yaml
//! beds:
//!   - bed_id: W1-01
//!     bed_number: W1-01
//!     room_type: General Ward
//!     daily_rate: 150000
//! ```
//!
//! Seeding creates any bed missing from the store as `VACANT` and never touches existing beds.

use crate::error::{BedError, BedResult};
use crate::ids::BedId;
use crate::model::{Bed, RoomInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One bed as declared in the inventory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryBed {
    pub bed_id: BedId,
    pub bed_number: String,
    pub room: RoomInfo,
}

impl InventoryBed {
    pub fn into_vacant_bed(self, tat_duration_secs: u64, now: DateTime<Utc>) -> Bed {
        Bed::vacant(self.bed_id, self.bed_number, self.room, tat_duration_secs, now)
    }
}

/// Outcome of seeding an inventory into the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub created: Vec<BedId>,
    pub skipped: Vec<BedId>,
}

/// Bed inventory operations.
///
/// This is a zero-sized type used for namespacing inventory parsing and rendering.
pub struct BedInventory;

impl BedInventory {
    /// Parse an inventory from YAML text.
    ///
    /// Schema mismatches are reported with the path of the failing field (e.g. `beds[2].room_type`).
    ///
    /// # Errors
    ///
    /// Returns [`BedError::InventoryParse`] if the YAML does not match the schema, contains
    /// unknown keys, or declares the same bed id twice, and [`BedError::InvalidInput`] for an
    /// invalid bed id.
    pub fn parse(yaml_text: &str) -> BedResult<Vec<InventoryBed>> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);

        let wire = match serde_path_to_error::deserialize::<_, InventoryWire>(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(BedError::InventoryParse(format!(
                    "schema mismatch at {path}: {source}"
                )));
            }
        };

        let mut seen = HashSet::new();
        let mut beds = Vec::with_capacity(wire.beds.len());
        for entry in wire.beds {
            let bed_id = BedId::parse(&entry.bed_id)?;
            if !seen.insert(bed_id.clone()) {
                return Err(BedError::InventoryParse(format!(
                    "bed id {bed_id} is declared more than once"
                )));
            }
            let bed_number = match entry.bed_number {
                Some(number) if !number.trim().is_empty() => number.trim().to_string(),
                _ => bed_id.to_string(),
            };
            let room_type = entry.room_type.trim().to_string();
            if room_type.is_empty() {
                return Err(BedError::InventoryParse(format!(
                    "bed {bed_id} has an empty room_type"
                )));
            }
            beds.push(InventoryBed {
                bed_id,
                bed_number,
                room: RoomInfo {
                    room_type,
                    daily_rate: entry.daily_rate,
                },
            });
        }
        Ok(beds)
    }

    /// Read and parse an inventory file.
    pub fn load(path: &Path) -> BedResult<Vec<InventoryBed>> {
        let text = std::fs::read_to_string(path).map_err(BedError::FileRead)?;
        Self::parse(&text)
    }

    /// Render the identity fields of `beds` as an inventory document.
    pub fn render(beds: &[Bed]) -> BedResult<String> {
        let wire = InventoryWire {
            beds: beds
                .iter()
                .map(|bed| InventoryBedWire {
                    bed_id: bed.bed_id.to_string(),
                    bed_number: Some(bed.bed_number.clone()),
                    room_type: bed.room.room_type.clone(),
                    daily_rate: bed.room.daily_rate,
                })
                .collect(),
        };
        serde_yaml::to_string(&wire)
            .map_err(|e| BedError::InventoryParse(format!("failed to serialize inventory: {e}")))
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct InventoryWire {
    beds: Vec<InventoryBedWire>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct InventoryBedWire {
    bed_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bed_number: Option<String>,
    room_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    daily_rate: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
beds:
  - bed_id: W1-01
    bed_number: Ward 1 / 01
    room_type: General Ward
    daily_rate: 150000
  - bed_id: ICU-1
    room_type: ICU
"#;

    #[test]
    fn parses_inventory() {
        let beds = BedInventory::parse(INVENTORY).unwrap();
        assert_eq!(beds.len(), 2);
        assert_eq!(beds[0].bed_number, "Ward 1 / 01");
        assert_eq!(beds[0].room.daily_rate, Some(150_000));
        assert_eq!(beds[1].bed_number, "ICU-1");
        assert_eq!(beds[1].room.daily_rate, None);
    }

    #[test]
    fn schema_errors_carry_field_path() {
        let yaml = "beds:\n  - bed_id: B1\n    room_type: ICU\n    daly_rate: 10\n";
        let err = BedInventory::parse(yaml).unwrap_err();
        match err {
            BedError::InventoryParse(message) => {
                assert!(message.contains("beds[0]"), "{message}");
                assert!(message.contains("daly_rate"), "{message}");
            }
            other => panic!("expected inventory error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_bed_ids_are_rejected() {
        let yaml = "beds:\n  - bed_id: B1\n    room_type: ICU\n  - bed_id: B1\n    room_type: ICU\n";
        assert!(matches!(
            BedInventory::parse(yaml),
            Err(BedError::InventoryParse(_))
        ));
    }

    #[test]
    fn invalid_bed_id_is_rejected() {
        let yaml = "beds:\n  - bed_id: bed 1\n    room_type: ICU\n";
        assert!(matches!(
            BedInventory::parse(yaml),
            Err(BedError::InvalidInput(_))
        ));
    }

    #[test]
    fn rendered_inventory_parses_back() {
        let beds: Vec<Bed> = BedInventory::parse(INVENTORY)
            .unwrap()
            .into_iter()
            .map(|bed| bed.into_vacant_bed(1800, Utc::now()))
            .collect();
        let text = BedInventory::render(&beds).unwrap();
        let reparsed = BedInventory::parse(&text).unwrap();
        assert_eq!(reparsed.len(), 2);
        assert_eq!(reparsed[0].bed_id, beds[0].bed_id);
    }
}
