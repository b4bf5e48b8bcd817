//! API routes for casetrackd.
//!
//! Handlers stay thin: validate at the boundary, delegate to the engines,
//! shape the response. Error bodies are always structured JSON of the form
//! `{ "error": { "message", "details"? } }`.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use casetrack_shared::api::{
    AuthRequest, CaseStatsResponse, CreateEventRequest, EventWithCase, HealthResponse,
    ListCasesQuery, ListCasesResponse, OverviewQuery, SetThreadRequest, SubmitCaseRequest,
    ThreadLookupResponse, UpdateCaseRequest,
};
use casetrack_shared::error::FieldError;
use casetrack_shared::{Case, Error, Event};

use crate::analytics::TrendPeriod;
use crate::intake::IntakeOutcome;
use crate::server::AppState;
use crate::store::NewEvent;

type AppStateArc = Arc<AppState>;

/// Boundary wrapper mapping the error taxonomy onto HTTP.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": { "message": "Validation error", "details": details }
                })),
            )
                .into_response(),
            Error::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": { "message": format!("{what} not found") } })),
            )
                .into_response(),
            Error::Store(message) => {
                error!("Store failure: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": { "message": "Internal server error" } })),
                )
                    .into_response()
            }
            // The intake engine swallows upstream errors; anything arriving
            // here came from an unexpected path.
            Error::Upstream(message) => {
                error!("Upstream failure reached the boundary: {message}");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": { "message": "Upstream error" } })),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// Case Routes
// ============================================================================

pub fn case_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/cases", get(list_cases).post(submit_case))
        .route("/api/cases/stats", get(case_stats))
        .route("/api/cases/thread/:thread_id", get(case_by_thread))
        .route("/api/cases/:codigo_sc", get(get_case))
        .route("/api/cases/:codigo_sc/update", post(update_case))
        .route("/api/cases/:codigo_sc/thread", post(set_thread))
        .route("/api/cases/:codigo_sc/delete", post(delete_case))
        .route(
            "/api/cases/:codigo_sc/events",
            get(case_events).post(create_event),
        )
}

async fn list_cases(
    State(state): State<AppStateArc>,
    Query(query): Query<ListCasesQuery>,
) -> Result<Json<ListCasesResponse>, ApiError> {
    let (cases, total) = state.store.list_cases(&query).await?;
    Ok(Json(ListCasesResponse { cases, total }))
}

async fn case_stats(
    State(state): State<AppStateArc>,
) -> Result<Json<CaseStatsResponse>, ApiError> {
    Ok(Json(state.store.case_stats().await?))
}

async fn case_by_thread(
    State(state): State<AppStateArc>,
    Path(thread_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.store.find_case_by_thread(&thread_id).await? {
        Some(case_item) => Ok(Json(ThreadLookupResponse {
            found: true,
            case_item,
        })
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "found": false,
                "message": "No case found with this thread ID",
                "threadId": thread_id,
            })),
        )
            .into_response()),
    }
}

async fn get_case(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
) -> Result<Json<Case>, ApiError> {
    Ok(Json(state.store.get_case(&codigo_sc).await?))
}

async fn submit_case(
    State(state): State<AppStateArc>,
    Json(request): Json<SubmitCaseRequest>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    let mode = request.duplicate_mode.unwrap_or_default();
    let (case, outcome) = state.intake.submit(request.case, mode).await?;
    let status = match outcome {
        IntakeOutcome::Created => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(case)))
}

async fn update_case(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
    Json(update): Json<UpdateCaseRequest>,
) -> Result<Json<Case>, ApiError> {
    Ok(Json(state.intake.update(&codigo_sc, update).await?))
}

async fn set_thread(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
    Json(request): Json<SetThreadRequest>,
) -> Result<Json<Case>, ApiError> {
    if request.email_thread_id.trim().is_empty() {
        return Err(Error::Validation(vec![FieldError::new(
            "emailThreadId",
            "Email thread ID is required",
        )])
        .into());
    }
    Ok(Json(
        state
            .intake
            .set_thread(&codigo_sc, request.email_thread_id)
            .await?,
    ))
}

async fn delete_case(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.intake.delete(&codigo_sc).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn case_events(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.store.events_for_case(&codigo_sc).await?))
}

async fn create_event(
    State(state): State<AppStateArc>,
    Path(codigo_sc): Path<String>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    if request.description.trim().is_empty() {
        return Err(Error::Validation(vec![FieldError::new(
            "description",
            "Description is required",
        )])
        .into());
    }
    let event = state
        .store
        .insert_event(
            &codigo_sc,
            NewEvent {
                event_type: request.event_type,
                description: request.description,
                metadata: request.metadata,
                timestamp: request.timestamp,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

// ============================================================================
// Event Routes
// ============================================================================

pub fn event_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/events/:event_id", get(get_event))
        .route("/api/events/:event_id/delete", post(delete_event))
}

async fn get_event(
    State(state): State<AppStateArc>,
    Path(event_id): Path<String>,
) -> Result<Json<EventWithCase>, ApiError> {
    let (event, case_item) = state.store.get_event(&event_id).await?;
    Ok(Json(EventWithCase { event, case_item }))
}

async fn delete_event(
    State(state): State<AppStateArc>,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_event(&event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Analytics Routes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TrendsQuery {
    #[serde(default)]
    period: Option<String>,
}

pub fn analytics_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/analytics/overview", get(analytics_overview))
        .route("/api/analytics/trends", get(analytics_trends))
        .route("/api/analytics/distribution", get(analytics_distribution))
}

async fn analytics_overview(
    State(state): State<AppStateArc>,
    Query(query): Query<OverviewQuery>,
) -> Result<Response, ApiError> {
    let overview = state
        .analytics
        .overview(query.start_date, query.end_date)
        .await?;
    Ok(Json(overview).into_response())
}

async fn analytics_trends(
    State(state): State<AppStateArc>,
    Query(query): Query<TrendsQuery>,
) -> Result<Response, ApiError> {
    let raw = query.period.as_deref().unwrap_or("30d");
    let Some(period) = TrendPeriod::parse(raw) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": { "message": "Invalid period. Must be 7d, 30d, or 90d" }
            })),
        )
            .into_response());
    };
    Ok(Json(state.analytics.trends(period).await?).into_response())
}

async fn analytics_distribution(
    State(state): State<AppStateArc>,
) -> Result<Response, ApiError> {
    Ok(Json(state.analytics.distribution().await?).into_response())
}

// ============================================================================
// Auth Routes
// ============================================================================

pub fn auth_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/auth/login", post(auth_login))
        .route("/api/auth/verify", post(auth_verify))
}

fn check_password(state: &AppState, presented: &str) -> Result<bool, Response> {
    match state.config.auth.dashboard_password.as_deref() {
        None => {
            error!("Dashboard password is not configured");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "message": "Server configuration error" } })),
            )
                .into_response())
        }
        Some(expected) => Ok(expected == presented),
    }
}

async fn auth_login(
    State(state): State<AppStateArc>,
    Json(request): Json<AuthRequest>,
) -> Response {
    match check_password(&state, &request.password) {
        Err(response) => response,
        Ok(true) => Json(json!({ "success": true })).into_response(),
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Contraseña incorrecta" } })),
        )
            .into_response(),
    }
}

async fn auth_verify(
    State(state): State<AppStateArc>,
    Json(request): Json<AuthRequest>,
) -> Response {
    match check_password(&state, &request.password) {
        Err(response) => response,
        Ok(true) => Json(json!({ "valid": true })).into_response(),
        Ok(false) => (StatusCode::UNAUTHORIZED, Json(json!({ "valid": false }))).into_response(),
    }
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new().route("/api/admin/reset-db", post(reset_db))
}

async fn reset_db(State(state): State<AppStateArc>) -> Result<Response, ApiError> {
    state.store.reset().await?;
    tracing::info!("Database reset");
    Ok(Json(json!({
        "success": true,
        "message": "Database reset successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response())
}

// ============================================================================
// Health / Metrics Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(render_metrics))
}

/// Catch-all for unrouted paths.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "message": "Not found" } })),
    )
        .into_response()
}

async fn render_metrics(State(state): State<AppStateArc>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
