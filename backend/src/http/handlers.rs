//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer for business logic.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::csv_export;
use super::dto::{
    coerce_readings, CcvResponse, CreateSessionRequest, CycleTablesResponse, EndPhaseResponse,
    ExportResponse, HealthResponse, OcvResponse, ReadingsRequest, SessionListResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{SessionId, SessionInfo, SessionReport, TestSession};
use crate::db::services as db_services;
use crate::routes::export::GET_EXPORT_CSV;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn readings(request: &ReadingsRequest) -> Result<Vec<f64>, AppError> {
    coerce_readings(&request.values).map_err(AppError::BadRequest)
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Verify the service is running and the repository is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /v1/sessions
///
/// Dashboard listing, newest session first.
pub async fn list_sessions(State(state): State<AppState>) -> HandlerResult<SessionListResponse> {
    let sessions = db_services::list_session_summaries(state.repository.as_ref()).await?;
    let total = sessions.len();
    Ok(Json(SessionListResponse { sessions, total }))
}

/// POST /v1/sessions
///
/// Create a bank and its test session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionInfo>), AppError> {
    let info = db_services::create_test_session(
        state.repository.as_ref(),
        &request.name,
        request.description,
        request.num_cells,
        request.total_cycles,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /v1/sessions/{session_id}
///
/// Session, bank, progress and durations.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> HandlerResult<SessionReport> {
    let report =
        db_services::get_session_report(state.repository.as_ref(), SessionId::new(session_id))
            .await?;
    Ok(Json(report))
}

/// POST /v1/sessions/{session_id}/reconcile-status
///
/// Recompute the stored status from the session's cycles and position.
pub async fn reconcile_status(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> HandlerResult<TestSession> {
    let session =
        db_services::reconcile_status(state.repository.as_ref(), SessionId::new(session_id))
            .await?;
    Ok(Json(session))
}

// =============================================================================
// Readings
// =============================================================================

/// POST /v1/sessions/{session_id}/ocv
pub async fn submit_ocv(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(request): Json<ReadingsRequest>,
) -> HandlerResult<OcvResponse> {
    let values = readings(&request)?;
    let outcome = db_services::submit_ocv(
        state.repository.as_ref(),
        SessionId::new(session_id),
        &values,
        request.ccv_interval,
    )
    .await?;
    Ok(Json(outcome.into()))
}

/// POST /v1/sessions/{session_id}/ccv
pub async fn submit_ccv(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(request): Json<ReadingsRequest>,
) -> HandlerResult<CcvResponse> {
    let values = readings(&request)?;
    let outcome =
        db_services::submit_ccv(state.repository.as_ref(), SessionId::new(session_id), &values)
            .await?;
    Ok(Json(outcome.into()))
}

/// POST /v1/sessions/{session_id}/end-phase
pub async fn end_phase(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> HandlerResult<EndPhaseResponse> {
    let transition =
        db_services::end_phase(state.repository.as_ref(), SessionId::new(session_id)).await?;
    Ok(Json(transition.into()))
}

// =============================================================================
// Aggregated views
// =============================================================================

/// GET /v1/sessions/{session_id}/cycles
pub async fn get_cycle_tables(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> HandlerResult<CycleTablesResponse> {
    let session_id = SessionId::new(session_id);
    let cycles = db_services::get_cycle_tables(state.repository.as_ref(), session_id).await?;
    Ok(Json(CycleTablesResponse { session_id, cycles }))
}

/// GET /v1/sessions/{session_id}/export
pub async fn get_export(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> HandlerResult<ExportResponse> {
    let table =
        db_services::get_export_table(state.repository.as_ref(), SessionId::new(session_id))
            .await?;
    Ok(Json(table.into()))
}

/// GET /v1/sessions/{session_id}/export.csv
///
/// The export as a CSV attachment named `test_{id}_export.csv`.
pub async fn get_export_csv(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Response, AppError> {
    let session_id = SessionId::new(session_id);
    let table = db_services::get_export_table(state.repository.as_ref(), session_id)
        .await
        .map_err(|e| e.with_operation(GET_EXPORT_CSV))?;
    let body = csv_export::render_export(&table)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV: {}", e)))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        csv_export::export_filename(session_id)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
