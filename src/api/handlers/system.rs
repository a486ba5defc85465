//! System endpoints: health check and adapter catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    channels: usize,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp, and the number of pooled channels.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            channels: state.realtime_service.pool().len(),
        }),
    )
}

/// Domain adapter metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdapterInfo {
    adapter: &'static str,
    channel: &'static str,
    table: &'static str,
    event: &'static str,
    filter: &'static str,
}

/// `GET /config/adapters`: List the domain adapters a client can follow.
#[utoipa::path(
    get,
    path = "/config/adapters",
    tag = "System",
    summary = "List domain adapters",
    description = "Returns the channel template and predicate of every domain adapter.",
    responses(
        (status = 200, description = "Adapter catalog", body = Vec<AdapterInfo>),
    )
)]
pub async fn adapters_handler() -> impl IntoResponse {
    let adapters = vec![
        AdapterInfo {
            adapter: "booking",
            channel: "booking-<booking_id>",
            table: "bookings",
            event: "UPDATE",
            filter: "id=eq.<booking_id>",
        },
        AdapterInfo {
            adapter: "trip",
            channel: "trip-<trip_id>",
            table: "trips",
            event: "UPDATE",
            filter: "id=eq.<trip_id>",
        },
        AdapterInfo {
            adapter: "trip_assignment",
            channel: "trip-assignment-<trip_id>",
            table: "trip_guides",
            event: "*",
            filter: "trip_id=eq.<trip_id>",
        },
        AdapterInfo {
            adapter: "wallet_balance",
            channel: "wallet-<wallet_type>-<user_id>",
            table: "mitra_wallet_transactions | guide_wallet_transactions",
            event: "*",
            filter: "user_id=eq.<user_id>",
        },
        AdapterInfo {
            adapter: "wallet_transactions",
            channel: "wallet-transactions-<wallet_type>-<user_id>",
            table: "mitra_wallet_transactions | guide_wallet_transactions",
            event: "INSERT",
            filter: "user_id=eq.<user_id>",
        },
        AdapterInfo {
            adapter: "availability",
            channel: "availability-<package_id> | availability-multi-<package_id>",
            table: "bookings",
            event: "*",
            filter: "package_id=eq.<package_id>",
        },
    ];
    (StatusCode::OK, Json(adapters))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/adapters", get(adapters_handler))
}
