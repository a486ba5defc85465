//! Realtime error types with HTTP status code mapping.
//!
//! [`RealtimeError`] is the central error type for the subscription layer
//! and the relay surfaces built on it. Each variant maps to a numeric code
//! and an HTTP status so REST handlers can return it directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1002,
///     "message": "invalid filter: unknown operator `like`",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error enum for the realtime layer.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server          | 500 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Channel names must be non-empty and free of whitespace.
    #[error("invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// A row filter could not be parsed.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A row change violates the `new`/`old` shape for its event type.
    #[error("invalid row change: {0}")]
    InvalidChange(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A live channel already exists under this name with another config.
    #[error("channel {name} already exists with a different configuration")]
    ConfigMismatch {
        /// Name of the conflicting channel.
        name: String,
    },

    /// No channel with the given name is registered in the pool.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// A row payload could not be decoded into the adapter's domain type.
    #[error("failed to decode {table} row on channel {channel}: {source}")]
    Decode {
        /// Channel the payload arrived on.
        channel: String,
        /// Source table of the payload.
        table: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The transport refused to open a physical subscription.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Channels need a tokio runtime to run their dispatcher.
    #[error("no tokio runtime available to drive the channel")]
    NoRuntime,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidChannelName(_) => 1001,
            Self::InvalidFilter(_) => 1002,
            Self::InvalidChange(_) => 1003,
            Self::InvalidRequest(_) => 1004,
            Self::Decode { .. } => 1005,
            Self::ChannelNotFound(_) => 2001,
            Self::ConfigMismatch { .. } => 2002,
            Self::Internal(_) => 3000,
            Self::TransportUnavailable(_) => 3001,
            Self::NoRuntime => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidChannelName(_)
            | Self::InvalidFilter(_)
            | Self::InvalidChange(_)
            | Self::InvalidRequest(_)
            | Self::Decode { .. } => StatusCode::BAD_REQUEST,
            Self::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConfigMismatch { .. } => StatusCode::CONFLICT,
            Self::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoRuntime | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RealtimeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::Decode { source, .. } => Some(source.to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
