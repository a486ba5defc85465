//! Channel introspection DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ChangeEvent, ChannelState};
use crate::realtime::ChannelSummary;

/// One pooled channel as returned by `GET /channels`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChannelDto {
    /// Channel name.
    pub name: String,
    /// Schema of the watched table.
    pub schema: String,
    /// Watched table.
    pub table: String,
    /// Watched event kind.
    pub event: ChangeEvent,
    /// Row filter in `column=op.value` form.
    pub filter: Option<String>,
    /// Connection state.
    pub state: ChannelState,
    /// Number of registered listeners.
    pub listeners: usize,
    /// Row changes dispatched so far.
    pub delivered: u64,
    /// Listener invocations that failed.
    pub callback_failures: u64,
}

impl From<ChannelSummary> for ChannelDto {
    fn from(summary: ChannelSummary) -> Self {
        Self {
            name: summary.name.to_string(),
            schema: summary.schema,
            table: summary.table,
            event: summary.event,
            filter: summary.filter,
            state: summary.state,
            listeners: summary.listeners,
            delivered: summary.delivered,
            callback_failures: summary.callback_failures,
        }
    }
}

/// Response body for `GET /channels`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelListResponse {
    /// Channels sorted by name.
    pub data: Vec<ChannelDto>,
    /// Number of channels.
    pub total: usize,
}
