//! Conversions between core types and wire DTOs.

use api_shared::{
    AdmissionRes, BedEventRes, BedRes, ConsistencyIssueRes, ConsistencyRes, FormRes, TatRes,
};
use bedboard_core::tat::TatState;
use bedboard_core::{
    Admission, BedError, BedEvent, BedResult, BedView, ConsistencyIssue, ConsistencyReport,
    TatReading,
};
use chrono::{DateTime, SecondsFormat, Utc};

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an optional RFC 3339 timestamp supplied by a client.
pub fn parse_timestamp(field: &str, value: Option<&str>) -> BedResult<Option<DateTime<Utc>>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|e| {
                    BedError::InvalidInput(format!("{field} must be an RFC 3339 timestamp: {e}"))
                })
        })
        .transpose()
}

pub fn tat_res(state: &TatState, reading: &TatReading) -> TatRes {
    TatRes {
        status: reading.status.to_string(),
        started_at: state.started_at.map(timestamp),
        duration_secs: state.duration_secs,
        remaining_secs: reading.remaining_secs,
        elapsed_secs: reading.elapsed_secs,
        deadline: reading.deadline.map(timestamp),
    }
}

pub fn bed_res(view: &BedView) -> BedRes {
    let bed = &view.bed;
    BedRes {
        bed_id: bed.bed_id.to_string(),
        bed_number: bed.bed_number.clone(),
        room_type: bed.room.room_type.clone(),
        daily_rate: bed.room.daily_rate,
        status: bed.status().to_string(),
        patient_id: bed.occupancy.patient_id().map(ToString::to_string),
        active_admission_id: bed.active_admission_id().map(|id| id.to_string()),
        tat: tat_res(&bed.tat, &view.tat),
        forms: bed
            .forms
            .iter()
            .map(|(key, entry)| FormRes {
                form_key: key.to_string(),
                submitted: entry.submitted,
                payload: entry.payload.clone(),
                updated_at: timestamp(entry.updated_at),
            })
            .collect(),
        revision: bed.revision,
        updated_at: timestamp(bed.updated_at),
    }
}

pub fn admission_res(admission: &Admission) -> AdmissionRes {
    AdmissionRes {
        admission_id: admission.id.to_string(),
        admission_number: admission.number.to_string(),
        patient_id: admission.patient_id.to_string(),
        bed_id: admission.bed_id.to_string(),
        bed_number: admission.bed_number.clone(),
        room_type: admission.room_type.clone(),
        department: admission.department.to_string(),
        admitted_at: timestamp(admission.admitted_at),
        discharged_at: admission.discharged_at.map(timestamp),
        rolled_back_at: admission.rolled_back_at.map(timestamp),
        status: admission.status.to_string(),
    }
}

fn issue_res(issue: &ConsistencyIssue) -> ConsistencyIssueRes {
    match issue {
        ConsistencyIssue::OccupiedBedMissingAdmission {
            bed_id,
            admission_id,
        } => ConsistencyIssueRes {
            kind: "occupied_bed_missing_admission".into(),
            bed_id: Some(bed_id.to_string()),
            admission_id: Some(admission_id.to_string()),
            detail: format!("bed {bed_id} references admission {admission_id}, which does not exist"),
        },
        ConsistencyIssue::OccupiedBedAdmissionNotAdmitted {
            bed_id,
            admission_id,
            status,
        } => ConsistencyIssueRes {
            kind: "occupied_bed_admission_not_admitted".into(),
            bed_id: Some(bed_id.to_string()),
            admission_id: Some(admission_id.to_string()),
            detail: format!("bed {bed_id} is occupied but admission {admission_id} is {status}"),
        },
        ConsistencyIssue::BedAdmissionMismatch {
            bed_id,
            admission_id,
            admission_bed_id,
        } => ConsistencyIssueRes {
            kind: "bed_admission_mismatch".into(),
            bed_id: Some(bed_id.to_string()),
            admission_id: Some(admission_id.to_string()),
            detail: format!(
                "bed {bed_id} references admission {admission_id}, which belongs to bed {admission_bed_id}"
            ),
        },
        ConsistencyIssue::OrphanedAdmission {
            admission_id,
            admission_number,
            bed_id,
        } => ConsistencyIssueRes {
            kind: "orphaned_admission".into(),
            bed_id: Some(bed_id.to_string()),
            admission_id: Some(admission_id.to_string()),
            detail: format!(
                "admission {admission_number} is ADMITTED but bed {bed_id} does not reference it"
            ),
        },
    }
}

pub fn consistency_res(report: &ConsistencyReport) -> ConsistencyRes {
    ConsistencyRes {
        checked_at: timestamp(report.checked_at),
        beds_checked: report.beds_checked as u64,
        admissions_checked: report.admissions_checked as u64,
        consistent: report.is_consistent(),
        issues: report.issues.iter().map(issue_res).collect(),
    }
}

/// Event payload with the countdown evaluated at delivery time.
pub fn bed_event_res(event: &BedEvent) -> BedEventRes {
    BedEventRes {
        kind: event.kind.to_string(),
        emitted_at: timestamp(event.emitted_at),
        bed: bed_res(&BedView::at(event.bed.clone(), Utc::now())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_timestamps() {
        assert_eq!(parse_timestamp("admitted_at", None).unwrap(), None);
        assert_eq!(parse_timestamp("admitted_at", Some("  ")).unwrap(), None);

        let parsed = parse_timestamp("admitted_at", Some("2024-03-01T15:30:00+05:30"))
            .unwrap()
            .unwrap();
        assert_eq!(timestamp(parsed), "2024-03-01T10:00:00Z");

        assert!(matches!(
            parse_timestamp("admitted_at", Some("yesterday")),
            Err(BedError::InvalidInput(message)) if message.starts_with("admitted_at")
        ));
    }
}
