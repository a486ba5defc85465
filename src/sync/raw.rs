//! Pass-through adapter for ad-hoc channels.

use serde_json::Value;

use super::DomainAdapter;
use crate::domain::{ChannelConfig, ChannelName, RowChange};
use crate::error::RealtimeError;

/// Delivers raw row changes for a caller-chosen name and predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSync {
    name: ChannelName,
    config: ChannelConfig,
}

impl RawSync {
    /// Adapter for `name` with predicate `config`.
    #[must_use]
    pub const fn new(name: ChannelName, config: ChannelConfig) -> Self {
        Self { name, config }
    }
}

impl DomainAdapter for RawSync {
    type Event = RowChange<Value>;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        Ok(self.name.clone())
    }

    fn channel_config(&self) -> ChannelConfig {
        self.config.clone()
    }

    fn transform(
        &self,
        change: &RowChange<Value>,
    ) -> Result<Option<RowChange<Value>>, RealtimeError> {
        Ok(Some(change.clone()))
    }
}
