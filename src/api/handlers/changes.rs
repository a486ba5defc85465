//! Row-change ingestion handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{IngestChangeRequest, IngestChangeResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RealtimeError};

/// `POST /changes`: Publish a row change to matching channels.
///
/// # Errors
///
/// Returns a 400 error if the change shape does not fit its event kind.
#[utoipa::path(
    post,
    path = "/api/v1/changes",
    tag = "Changes",
    summary = "Ingest a row change",
    description = "Routes an INSERT, UPDATE, or DELETE to every channel whose table, event, and filter match. INSERT carries only `new`, DELETE only `old`, UPDATE both.",
    request_body = IngestChangeRequest,
    responses(
        (status = 202, description = "Change routed", body = IngestChangeResponse),
        (status = 400, description = "Invalid change", body = ErrorResponse),
    )
)]
pub async fn ingest_change(
    State(state): State<AppState>,
    Json(req): Json<IngestChangeRequest>,
) -> Result<impl IntoResponse, RealtimeError> {
    let service = &state.realtime_service;
    let change = req.into_change(service.schema())?;
    let delivered = service.ingest(&change);
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestChangeResponse {
            delivered,
            commit_timestamp: change.commit_timestamp(),
        }),
    ))
}

/// Ingestion routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/changes", post(ingest_change))
}
