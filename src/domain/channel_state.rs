//! Connection status of a physical subscription.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

/// Status transition reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    /// The server confirmed the subscription (`SUBSCRIBED`).
    Subscribed,
    /// The server rejected or dropped the subscription (`CHANNEL_ERROR`).
    ChannelError(String),
    /// No confirmation arrived in time (`TIMED_OUT`).
    TimedOut,
    /// The subscription was closed (`CLOSED`).
    Closed,
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed => f.write_str("SUBSCRIBED"),
            Self::ChannelError(_) => f.write_str("CHANNEL_ERROR"),
            Self::TimedOut => f.write_str("TIMED_OUT"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Current state of a [`crate::realtime::RealtimeChannel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelState {
    /// Opened, waiting for the transport to confirm.
    Joining,
    /// Confirmed by the transport.
    Joined,
    /// Waiting to reopen after a transport failure.
    Reconnecting {
        /// Reconnect attempt number, starting at 1.
        attempt: u32,
    },
    /// The transport reported `CHANNEL_ERROR`.
    Errored {
        /// Reason given by the transport.
        message: String,
    },
    /// The transport reported `TIMED_OUT`.
    TimedOut,
    /// Closed locally or by the transport.
    Closed,
}

impl ChannelState {
    /// `true` only once the transport has confirmed the subscription.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        matches!(self, Self::Joined)
    }

    /// `true` while the channel can still deliver (or come to deliver)
    /// events without being reopened.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(
            self,
            Self::Joining | Self::Joined | Self::Reconnecting { .. }
        )
    }

    /// Error message a consumer should see for this state, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Errored { message } => Some(message.clone()),
            Self::TimedOut => Some("subscription timed out".to_string()),
            _ => None,
        }
    }
}

impl From<&TransportStatus> for ChannelState {
    fn from(status: &TransportStatus) -> Self {
        match status {
            TransportStatus::Subscribed => Self::Joined,
            TransportStatus::ChannelError(message) => Self::Errored {
                message: message.clone(),
            },
            TransportStatus::TimedOut => Self::TimedOut,
            TransportStatus::Closed => Self::Closed,
        }
    }
}
