//! Channel introspection handlers: list, get, force-close.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ChannelDto, ChannelListResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RealtimeError};

/// `GET /channels`: List pooled channels.
#[utoipa::path(
    get,
    path = "/api/v1/channels",
    tag = "Channels",
    summary = "List channels",
    description = "Returns every pooled channel with its predicate, state, and delivery counters.",
    responses(
        (status = 200, description = "Channel list", body = ChannelListResponse),
    )
)]
pub async fn list_channels(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<ChannelDto> = state
        .realtime_service
        .channels()
        .into_iter()
        .map(ChannelDto::from)
        .collect();
    let total = data.len();
    Json(ChannelListResponse { data, total })
}

/// `GET /channels/{name}`: Get one channel.
///
/// # Errors
///
/// Returns [`RealtimeError::ChannelNotFound`] if no channel has this name.
#[utoipa::path(
    get,
    path = "/api/v1/channels/{name}",
    tag = "Channels",
    summary = "Get channel",
    params(
        ("name" = String, Path, description = "Channel name, e.g. `booking-B123`"),
    ),
    responses(
        (status = 200, description = "Channel details", body = ChannelDto),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChannelDto>, RealtimeError> {
    let summary = state.realtime_service.channel(&name)?;
    Ok(Json(ChannelDto::from(summary)))
}

/// `DELETE /channels/{name}`: Close a channel for every listener.
///
/// # Errors
///
/// Returns [`RealtimeError::ChannelNotFound`] if no channel has this name.
#[utoipa::path(
    delete,
    path = "/api/v1/channels/{name}",
    tag = "Channels",
    summary = "Close channel",
    description = "Closes the physical subscription. Every listener stops receiving changes.",
    params(
        ("name" = String, Path, description = "Channel name"),
    ),
    responses(
        (status = 204, description = "Channel closed"),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn close_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, RealtimeError> {
    state.realtime_service.close_channel(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Channel routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/{name}", get(get_channel).delete(close_channel))
}
