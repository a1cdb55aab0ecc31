//! Wire types for the bed board APIs.
//!
//! Timestamps travel as RFC 3339 strings. Request bodies reject unknown fields so a misspelled
//! field is an error rather than silently ignored.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// TAT countdown evaluated at response time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TatRes {
    /// IDLE, RUNNING, COMPLETED or EXPIRED.
    pub status: String,
    pub started_at: Option<String>,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub elapsed_secs: u64,
    pub deadline: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormRes {
    pub form_key: String,
    pub submitted: bool,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BedRes {
    pub bed_id: String,
    pub bed_number: String,
    pub room_type: String,
    /// Daily rate in minor currency units.
    pub daily_rate: Option<u64>,
    /// VACANT or OCCUPIED.
    pub status: String,
    pub patient_id: Option<String>,
    pub active_admission_id: Option<String>,
    pub tat: TatRes,
    pub forms: Vec<FormRes>,
    pub revision: u64,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListBedsRes {
    pub beds: Vec<BedRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdmitReq {
    pub patient_id: String,
    pub department: String,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub admitted_at: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DischargeReq {
    #[serde(default)]
    pub discharged_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct FormFlagReq {
    pub submitted: bool,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdmissionRes {
    pub admission_id: String,
    /// Rendered as IPD-YYYYMMDD-NNN.
    pub admission_number: String,
    pub patient_id: String,
    pub bed_id: String,
    pub bed_number: String,
    pub room_type: String,
    pub department: String,
    pub admitted_at: String,
    pub discharged_at: Option<String>,
    pub rolled_back_at: Option<String>,
    /// ADMITTED, DISCHARGED or ROLLED_BACK.
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListAdmissionsRes {
    pub admissions: Vec<AdmissionRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyIssueRes {
    pub kind: String,
    pub bed_id: Option<String>,
    pub admission_id: Option<String>,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyRes {
    pub checked_at: String,
    pub beds_checked: u64,
    pub admissions_checked: u64,
    pub consistent: bool,
    pub issues: Vec<ConsistencyIssueRes>,
}

/// Payload of one server-sent bed change event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BedEventRes {
    /// CREATED or UPDATED.
    pub kind: String,
    pub emitted_at: String,
    pub bed: BedRes,
}
