//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and
//! `/config/adapters` at the root. With the `swagger-ui` feature the
//! OpenAPI document is served at `/api-docs/openapi.json` and browsable at
//! `/swagger-ui`.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

pub use openapi::ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use utoipa::OpenApi;

    use super::*;
    use crate::realtime::RetryPolicy;
    use crate::realtime::test_support::eventually;
    use crate::service::{ChannelRequest, RealtimeService};
    use crate::transport::InMemoryTransport;

    fn state() -> AppState {
        let service = RealtimeService::new(InMemoryTransport::new(), RetryPolicy::disabled(), "public");
        AppState::new(Arc::new(service), 16)
    }

    async fn call(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let app = build_router().with_state(state.clone());
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        let Ok(request) = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
        else {
            panic!("request should build");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should read");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_channel_count() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("status"), Some(&json!("healthy")));
        assert_eq!(body.get("channels"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn adapter_catalog_lists_six_adapters() {
        let (status, body) = call(&state(), Method::GET, "/config/adapters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(6));
    }

    #[tokio::test]
    async fn channel_lifecycle_over_rest() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(4);
        let Ok(subscription) = state.realtime_service.subscribe(
            ChannelRequest::Booking {
                booking_id: "B1".to_string(),
            },
            tx,
        ) else {
            panic!("subscribe should succeed");
        };
        assert!(eventually(|| subscription.is_subscribed()).await);

        let (status, body) = call(&state, Method::GET, "/api/v1/channels", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("total"), Some(&json!(1)));

        let (status, body) = call(&state, Method::GET, "/api/v1/channels/booking-B1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("filter"), Some(&json!("id=eq.B1")));
        assert_eq!(body.pointer("/state/state"), Some(&json!("joined")));

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/changes",
            Some(json!({
                "table": "bookings",
                "event": "UPDATE",
                "new": {"id": "B1", "status": "confirmed"},
                "old": {"id": "B1", "status": "pending"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.get("delivered"), Some(&json!(1)));
        let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await
        else {
            panic!("expected relayed event");
        };
        assert_eq!(event.event, json!({"id": "B1", "status": "confirmed"}));

        let (status, _) = call(&state, Method::DELETE, "/api/v1/channels/booking-B1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&state, Method::GET, "/api/v1/channels/booking-B1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.pointer("/error/code"), Some(&json!(2001)));
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn malformed_change_is_rejected() {
        let (status, body) = call(
            &state(),
            Method::POST,
            "/api/v1/changes",
            Some(json!({"table": "bookings", "event": "DELETE", "new": {"id": "B1"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.pointer("/error/code"), Some(&json!(1003)));
    }

    #[test]
    fn openapi_lists_every_path() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/config/adapters",
            "/api/v1/channels",
            "/api/v1/channels/{name}",
            "/api/v1/changes",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
