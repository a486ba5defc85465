//! Transport contract: the collaborator that owns physical subscriptions.
//!
//! A [`Transport`] opens one physical subscription per channel and pushes
//! [`TransportMessage`]s (row changes and status transitions) into an
//! unbounded queue, in the order the source produced them. The subscription
//! layer never talks to the network itself.

pub mod in_memory;

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{ChannelConfig, ChannelName, RowChange, TransportStatus};
use crate::error::RealtimeError;

pub use in_memory::InMemoryTransport;

/// Message pushed by the transport for one physical subscription.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// A row matching the channel predicate changed.
    Change(RowChange<Value>),
    /// The connection status changed.
    Status(TransportStatus),
}

/// Handle used to close a physical subscription.
pub trait TransportHandle: Send + Sync + fmt::Debug {
    /// Closes the physical subscription. Must be idempotent.
    fn close(&self);
}

/// Result of [`Transport::open`].
#[derive(Debug)]
pub struct OpenedChannel {
    /// Ordered stream of changes and status transitions.
    pub messages: mpsc::UnboundedReceiver<TransportMessage>,
    /// Handle that tears the physical subscription down.
    pub handle: Box<dyn TransportHandle>,
}

/// Opens physical subscriptions for `(schema, table, event, filter)`
/// predicates.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens a physical subscription. Confirmation arrives later as a
    /// [`TransportStatus::Subscribed`] message.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportUnavailable`] if the subscription
    /// cannot be opened at all.
    fn open(&self, name: &ChannelName, config: &ChannelConfig)
    -> Result<OpenedChannel, RealtimeError>;
}
