//! # travel-realtime
//!
//! Realtime row-change subscriptions for a travel booking platform.
//!
//! UI components and relay clients follow booking status, trip status,
//! trip-guide assignments, wallet balances, wallet transactions, and
//! package availability. Every follower of the same channel shares one
//! physical subscription held by the [`realtime::SubscriptionPool`].
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── RealtimeService (service/)
//!     ├── Domain adapters (sync/)
//!     │
//!     ├── Hooks, SubscriptionPool, RealtimeChannel (realtime/)
//!     │
//!     └── Transport (transport/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod realtime;
pub mod service;
pub mod sync;
pub mod transport;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the full HTTP router: REST, WebSocket, and middleware.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
