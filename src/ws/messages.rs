//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::service::ChannelRequest;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: Value,
}

impl WsMessage {
    /// Response to the command with id `id`.
    #[must_use]
    pub fn response(id: String, payload: Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Server-pushed event with a fresh id.
    #[must_use]
    pub fn event(payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply to the command with id `id`.
    #[must_use]
    pub fn error(id: String, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: json!({
                "code": code,
                "message": message.into(),
            }),
        }
    }

    /// Serializes the envelope; `None` only if serialization fails.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client relayed domain event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's `payload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Follow a domain adapter's channel.
    Subscribe {
        /// Adapter selection, e.g. `{"adapter": "booking", "booking_id": "B1"}`.
        channel: ChannelRequest,
    },
    /// Stop following a channel.
    Unsubscribe {
        /// Name returned by the subscribe response.
        channel_name: String,
    },
    /// List the channels this connection follows.
    ListSubscriptions,
}

impl WsCommand {
    /// Wire names of every command.
    pub const NAMES: [&'static str; 3] = ["subscribe", "unsubscribe", "list_subscriptions"];

    /// `true` if `name` is a command tag this server understands.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }
}
