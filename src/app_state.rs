//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::RealtimeService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay service owning the subscription pool and transport.
    pub realtime_service: Arc<RealtimeService>,
    /// Events buffered per WebSocket connection.
    pub ws_outbound_capacity: usize,
}

impl AppState {
    /// Builds the state around `realtime_service`.
    #[must_use]
    pub fn new(realtime_service: Arc<RealtimeService>, ws_outbound_capacity: usize) -> Self {
        Self {
            realtime_service,
            ws_outbound_capacity: ws_outbound_capacity.max(1),
        }
    }
}
