//! Service layer: relay orchestration.
//!
//! [`RealtimeService`] binds client requests to domain adapters on the
//! shared [`crate::realtime::SubscriptionPool`] and feeds row changes into
//! the transport.

pub mod realtime_service;

pub use realtime_service::{ChannelRequest, EventSink, RealtimeService, RelayEvent};
