//! travel-realtime server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use travel_realtime::app_state::AppState;
use travel_realtime::build_app;
use travel_realtime::config::{LogFormat, RealtimeConfig};
use travel_realtime::service::RealtimeService;
use travel_realtime::transport::InMemoryTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = RealtimeConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(
        addr = %config.listen_addr,
        schema = %config.schema,
        retry_attempts = config.retry.max_attempts,
        "starting travel-realtime"
    );

    // Build service layer
    let service = Arc::new(RealtimeService::new(
        InMemoryTransport::new(),
        config.retry,
        config.schema.clone(),
    ));
    let app = build_app(AppState::new(
        Arc::clone(&service),
        config.ws_outbound_capacity,
    ));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = service.shutdown();
    tracing::info!(closed, "channels closed, bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
