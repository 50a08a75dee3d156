use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query},
    http::{StatusCode, header, request::Parts},
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::{
    AppState, EMPTY_ENTITY_MESSAGE, ReportMetrics, ReportState, ReportStatus, SseStream,
};

#[derive(Debug, Deserialize)]
pub struct StartReportRequest {
    #[serde(default)]
    pub entity_name: String,
}

#[derive(Debug, Serialize)]
pub struct StartReportResponse {
    pub report_id: String,
    pub entity_name: String,
    pub state: ReportState,
    pub capacity: ReportMetrics,
}

#[derive(Debug, Serialize)]
pub struct ListReportsResponse {
    pub reports: Vec<ReportStatus>,
    pub capacity: ReportMetrics,
}

pub fn report_router() -> Router<AppState> {
    Router::new()
        .route("/reports", post(start_report).get(list_reports))
        .route("/reports/:id", get(get_report))
        .route("/reports/:id/stream", get(stream_report))
}

#[instrument(skip_all, fields(entity_name = %payload.entity_name.trim()))]
async fn start_report(
    GuardedState(state): GuardedState,
    Json(payload): Json<StartReportRequest>,
) -> Result<(StatusCode, Json<StartReportResponse>), AppError> {
    let entity_name = payload.entity_name.trim();
    if entity_name.is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, EMPTY_ENTITY_MESSAGE));
    }

    let service = state.report_service();
    let report_id = service.start_report(entity_name)?;

    let response = StartReportResponse {
        report_id,
        entity_name: entity_name.to_string(),
        state: ReportState::Running,
        capacity: service.metrics(),
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn get_report(
    GuardedState(state): GuardedState,
    Path(report_id): Path<String>,
) -> Result<Json<ReportStatus>, AppError> {
    match state.report_service().status(&report_id) {
        Some(status) => Ok(Json(status)),
        None => Err(AppError::new(StatusCode::NOT_FOUND, "report not found")),
    }
}

async fn stream_report(
    GuardedState(state): GuardedState,
    Path(report_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    match state.report_service().event_stream(&report_id) {
        Some(stream) => Ok(Sse::new(stream).keep_alive(KeepAlive::new())),
        None => Err(AppError::new(StatusCode::NOT_FOUND, "report not found")),
    }
}

async fn list_reports(GuardedState(state): GuardedState) -> Json<ListReportsResponse> {
    let service = state.report_service();
    Json(ListReportsResponse {
        reports: service.list_reports(),
        capacity: service.metrics(),
    })
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Application state, available once the bearer token (if any) checks out.
///
/// The token is read from `Authorization: Bearer ..` or, for clients such as
/// `EventSource` that cannot set headers, from an `access_token` query parameter.
pub struct GuardedState(pub AppState);

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.auth_token() {
            let provided = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|value| value.trim().to_string())
                .or_else(|| {
                    Query::<TokenQuery>::try_from_uri(&parts.uri)
                        .ok()
                        .and_then(|Query(query)| query.access_token)
                });

            match provided {
                Some(token) if token == expected.as_str() => {}
                _ => {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState(state.clone()))
    }
}
