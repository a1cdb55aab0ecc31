//! # API REST
//!
//! REST API for the bed board.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - Server-sent events for bed changes
//! - REST-specific concerns (JSON serialization, CORS, status codes, store timeouts)
//!
//! Uses `api-shared` for wire types and `bedboard-core` for all bed and admission logic.

#![warn(rust_2018_idioms)]

pub mod convert;
mod error;
mod events;

pub use error::error_response;

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{
    AdmissionRes, AdmitReq, BedEventRes, BedRes, ConsistencyIssueRes, ConsistencyRes,
    DischargeReq, FormFlagReq, FormRes, HealthRes, HealthService, ListAdmissionsRes, ListBedsRes,
    TatRes,
};
use bedboard_core::{
    AdmissionId, AdmissionStatus, AdmitRequest, BedBoardService, BedError, BedId, BedResult,
    Department, PatientId,
};

type ApiError = (StatusCode, &'static str);

/// Application state shared across REST handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<BedBoardService>,
    store_timeout: Duration,
}

impl AppState {
    pub fn new(service: BedBoardService, store_timeout: Duration) -> Self {
        Self {
            service: Arc::new(service),
            store_timeout,
        }
    }

    pub fn service(&self) -> &BedBoardService {
        &self.service
    }

    /// Runs a blocking read off the async runtime, bounded by the store timeout.
    ///
    /// A read that times out is reported as store-unavailable and is safe to retry.
    async fn run_blocking<T, F>(&self, op: F) -> BedResult<T>
    where
        F: FnOnce(&BedBoardService) -> BedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_bounded(op)
            .await
            .unwrap_or_else(|reason| Err(BedError::StoreUnavailable(reason)))
    }

    /// Runs a blocking mutation of `bed_id`, bounded by the store timeout.
    ///
    /// The blocking call keeps running after a timeout and may still commit, so a timeout is
    /// reported as an unknown outcome, never as a retryable failure.
    async fn run_mutation<T, F>(
        &self,
        operation: &'static str,
        bed_id: BedId,
        op: F,
    ) -> BedResult<T>
    where
        F: FnOnce(&BedBoardService, &BedId) -> BedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let target = bed_id.clone();
        self.run_bounded(move |service| op(service, &target))
            .await
            .unwrap_or_else(|reason| {
                Err(BedError::OutcomeUnknown {
                    operation,
                    bed_id,
                    reason,
                })
            })
    }

    /// Returns `Err` with a reason when the result of `op` was not observed.
    async fn run_bounded<T, F>(&self, op: F) -> Result<BedResult<T>, String>
    where
        F: FnOnce(&BedBoardService) -> BedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let task = tokio::task::spawn_blocking(move || op(&service));
        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_error)) => Err(format!("store task failed: {join_error}")),
            Err(_) => Err(format!(
                "store did not respond within {} ms",
                self.store_timeout.as_millis()
            )),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_beds,
        get_bed,
        admit,
        discharge,
        update_form_flag,
        start_tat,
        stop_tat,
        events::bed_events,
        list_admissions,
        get_admission,
        check_consistency,
    ),
    components(schemas(
        HealthRes,
        TatRes,
        FormRes,
        BedRes,
        ListBedsRes,
        AdmitReq,
        DischargeReq,
        FormFlagReq,
        AdmissionRes,
        ListAdmissionsRes,
        ConsistencyIssueRes,
        ConsistencyRes,
        BedEventRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/beds", get(list_beds))
        .route("/beds/events", get(events::bed_events))
        .route("/beds/:bed_id", get(get_bed))
        .route("/beds/:bed_id/admit", post(admit))
        .route("/beds/:bed_id/discharge", post(discharge))
        .route("/beds/:bed_id/forms/:form_key", put(update_form_flag))
        .route("/beds/:bed_id/tat/start", post(start_tat))
        .route("/beds/:bed_id/tat/stop", post(stop_tat))
        .route("/admissions", get(list_admissions))
        .route("/admissions/:admission_id", get(get_admission))
        .route("/consistency", get(check_consistency))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_bed_id(raw: &str) -> Result<BedId, ApiError> {
    BedId::parse(raw).map_err(|e| error_response("Parse bed id", &e))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/beds",
    responses(
        (status = 200, description = "Bed board in bed number order", body = ListBedsRes),
        (status = 503, description = "Store unavailable")
    )
)]
/// List every bed with its countdown evaluated now.
#[axum::debug_handler]
async fn list_beds(State(state): State<AppState>) -> Result<Json<ListBedsRes>, ApiError> {
    match state.run_blocking(|service| service.list_beds()).await {
        Ok(beds) => Ok(Json(ListBedsRes {
            beds: beds.iter().map(convert::bed_res).collect(),
        })),
        Err(e) => Err(error_response("List beds", &e)),
    }
}

#[utoipa::path(
    get,
    path = "/beds/{bed_id}",
    params(("bed_id" = String, Path, description = "Bed identifier")),
    responses(
        (status = 200, description = "Bed", body = BedRes),
        (status = 400, description = "Invalid bed id"),
        (status = 404, description = "Bed not found")
    )
)]
#[axum::debug_handler]
async fn get_bed(
    State(state): State<AppState>,
    AxumPath(bed_id): AxumPath<String>,
) -> Result<Json<BedRes>, ApiError> {
    let bed_id = parse_bed_id(&bed_id)?;
    match state.run_blocking(move |service| service.get_bed(&bed_id)).await {
        Ok(view) => Ok(Json(convert::bed_res(&view))),
        Err(e) => Err(error_response("Get bed", &e)),
    }
}

#[utoipa::path(
    post,
    path = "/beds/{bed_id}/admit",
    params(("bed_id" = String, Path, description = "Bed identifier")),
    request_body = AdmitReq,
    responses(
        (status = 201, description = "Patient admitted", body = AdmissionRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Bed not found"),
        (status = 409, description = "Bed was just taken by someone else"),
        (status = 500, description = "Admission partially completed or outcome unknown"),
        (status = 503, description = "System error, please retry")
    )
)]
/// Admit a patient to a vacant bed and issue the admission number.
#[axum::debug_handler]
async fn admit(
    State(state): State<AppState>,
    AxumPath(bed_id): AxumPath<String>,
    Json(req): Json<AdmitReq>,
) -> Result<(StatusCode, Json<AdmissionRes>), ApiError> {
    let request = build_admit_request(&bed_id, req).map_err(|e| error_response("Admit", &e))?;

    match state
        .run_mutation("admit", request.bed_id.clone(), move |service, _| {
            service.admit(request)
        })
        .await
    {
        Ok(admission) => Ok((
            StatusCode::CREATED,
            Json(convert::admission_res(&admission)),
        )),
        Err(e) => Err(error_response("Admit", &e)),
    }
}

fn build_admit_request(bed_id: &str, req: AdmitReq) -> BedResult<AdmitRequest> {
    Ok(AdmitRequest {
        bed_id: BedId::parse(bed_id)?,
        patient_id: PatientId::parse(&req.patient_id)?,
        department: Department::parse(&req.department)?,
        admitted_at: convert::parse_timestamp("admitted_at", req.admitted_at.as_deref())?,
    })
}

#[utoipa::path(
    post,
    path = "/beds/{bed_id}/discharge",
    params(("bed_id" = String, Path, description = "Bed identifier")),
    request_body(content = DischargeReq, description = "Optional; discharge time defaults to now"),
    responses(
        (status = 200, description = "Patient discharged", body = AdmissionRes),
        (status = 400, description = "Malformed discharge body"),
        (status = 404, description = "Bed not found"),
        (status = 409, description = "Bed is not occupied"),
        (status = 500, description = "Discharge partially completed or outcome unknown"),
        (status = 503, description = "System error, please retry")
    )
)]
/// Discharge the patient occupying a bed. The body is optional.
#[axum::debug_handler]
async fn discharge(
    State(state): State<AppState>,
    AxumPath(bed_id): AxumPath<String>,
    body: Bytes,
) -> Result<Json<AdmissionRes>, ApiError> {
    let bed_id = parse_bed_id(&bed_id)?;
    let req = discharge_request(&body).map_err(|e| error_response("Discharge", &e))?;
    let discharged_at = convert::parse_timestamp("discharged_at", req.discharged_at.as_deref())
        .map_err(|e| error_response("Discharge", &e))?;

    match state
        .run_mutation("discharge", bed_id, move |service, bed_id| {
            service.discharge(bed_id, discharged_at)
        })
        .await
    {
        Ok(admission) => Ok(Json(convert::admission_res(&admission))),
        Err(e) => Err(error_response("Discharge", &e)),
    }
}

/// An empty body discharges now; any other body must be a valid [`DischargeReq`].
fn discharge_request(body: &[u8]) -> BedResult<DischargeReq> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(DischargeReq::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| BedError::InvalidInput(format!("discharge body: {e}")))
}

#[utoipa::path(
    put,
    path = "/beds/{bed_id}/forms/{form_key}",
    params(
        ("bed_id" = String, Path, description = "Bed identifier"),
        ("form_key" = String, Path, description = "Clinical form key, e.g. anaesthesia_consent")
    ),
    request_body = FormFlagReq,
    responses(
        (status = 200, description = "Form flag recorded", body = BedRes),
        (status = 400, description = "Unknown form key"),
        (status = 404, description = "Bed not found"),
        (status = 409, description = "Bed is not occupied")
    )
)]
/// Record completion of a clinical form for the bed's current admission.
#[axum::debug_handler]
async fn update_form_flag(
    State(state): State<AppState>,
    AxumPath((bed_id, form_key)): AxumPath<(String, String)>,
    Json(req): Json<FormFlagReq>,
) -> Result<Json<BedRes>, ApiError> {
    let bed_id = parse_bed_id(&bed_id)?;
    match state
        .run_mutation("form update", bed_id, move |service, bed_id| {
            service.update_bed_form_flag(bed_id, &form_key, req.submitted, req.payload)
        })
        .await
    {
        Ok(view) => Ok(Json(convert::bed_res(&view))),
        Err(e) => Err(error_response("Update form flag", &e)),
    }
}

#[utoipa::path(
    post,
    path = "/beds/{bed_id}/tat/start",
    params(("bed_id" = String, Path, description = "Bed identifier")),
    responses(
        (status = 200, description = "Countdown running", body = BedRes),
        (status = 409, description = "Bed not occupied or countdown not idle")
    )
)]
#[axum::debug_handler]
async fn start_tat(
    State(state): State<AppState>,
    AxumPath(bed_id): AxumPath<String>,
) -> Result<Json<BedRes>, ApiError> {
    let bed_id = parse_bed_id(&bed_id)?;
    match state
        .run_mutation("TAT start", bed_id, |service, bed_id| service.start_tat(bed_id))
        .await
    {
        Ok(view) => Ok(Json(convert::bed_res(&view))),
        Err(e) => Err(error_response("Start TAT", &e)),
    }
}

#[utoipa::path(
    post,
    path = "/beds/{bed_id}/tat/stop",
    params(("bed_id" = String, Path, description = "Bed identifier")),
    responses(
        (status = 200, description = "Countdown stopped", body = BedRes),
        (status = 409, description = "Bed not occupied or countdown not running")
    )
)]
#[axum::debug_handler]
async fn stop_tat(
    State(state): State<AppState>,
    AxumPath(bed_id): AxumPath<String>,
) -> Result<Json<BedRes>, ApiError> {
    let bed_id = parse_bed_id(&bed_id)?;
    match state
        .run_mutation("TAT stop", bed_id, |service, bed_id| service.stop_tat(bed_id))
        .await
    {
        Ok(view) => Ok(Json(convert::bed_res(&view))),
        Err(e) => Err(error_response("Stop TAT", &e)),
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct ListAdmissionsQuery {
    /// ADMITTED, DISCHARGED or ROLLED_BACK.
    status: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admissions",
    params(ListAdmissionsQuery),
    responses(
        (status = 200, description = "Admissions, newest first", body = ListAdmissionsRes),
        (status = 400, description = "Unknown status filter")
    )
)]
#[axum::debug_handler]
async fn list_admissions(
    State(state): State<AppState>,
    Query(query): Query<ListAdmissionsQuery>,
) -> Result<Json<ListAdmissionsRes>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(AdmissionStatus::parse)
        .transpose()
        .map_err(|e| error_response("List admissions", &e))?;

    match state
        .run_blocking(move |service| service.list_admissions(status))
        .await
    {
        Ok(admissions) => Ok(Json(ListAdmissionsRes {
            admissions: admissions.iter().map(convert::admission_res).collect(),
        })),
        Err(e) => Err(error_response("List admissions", &e)),
    }
}

#[utoipa::path(
    get,
    path = "/admissions/{admission_id}",
    params(("admission_id" = String, Path, description = "Admission id (32 lowercase hex)")),
    responses(
        (status = 200, description = "Admission", body = AdmissionRes),
        (status = 400, description = "Invalid admission id"),
        (status = 404, description = "Admission not found")
    )
)]
#[axum::debug_handler]
async fn get_admission(
    State(state): State<AppState>,
    AxumPath(admission_id): AxumPath<String>,
) -> Result<Json<AdmissionRes>, ApiError> {
    let admission_id =
        AdmissionId::parse(&admission_id).map_err(|e| error_response("Get admission", &e))?;
    match state
        .run_blocking(move |service| service.get_admission(admission_id))
        .await
    {
        Ok(admission) => Ok(Json(convert::admission_res(&admission))),
        Err(e) => Err(error_response("Get admission", &e)),
    }
}

#[utoipa::path(
    get,
    path = "/consistency",
    responses(
        (status = 200, description = "Bed/admission consistency report", body = ConsistencyRes),
        (status = 503, description = "Store unavailable")
    )
)]
/// Cross-check occupied beds against admission records.
#[axum::debug_handler]
async fn check_consistency(
    State(state): State<AppState>,
) -> Result<Json<ConsistencyRes>, ApiError> {
    match state
        .run_blocking(|service| service.check_consistency())
        .await
    {
        Ok(report) => Ok(Json(convert::consistency_res(&report))),
        Err(e) => Err(error_response("Consistency check", &e)),
    }
}
