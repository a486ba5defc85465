//! Realtime relay service: binds adapters to the pool and feeds the
//! transport.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use utoipa::ToSchema;

use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, RowChange};
use crate::error::RealtimeError;
use crate::realtime::{ChannelSummary, RetryPolicy, Subscription, SubscriptionPool};
use crate::sync::{
    self, AvailabilitySync, BookingSync, DomainAdapter, InSchema, RawSync, TripAssignmentSync,
    TripStatusSync, WalletBalanceSync, WalletTransactionSync, WalletType, event_callback,
};
use crate::transport::InMemoryTransport;

/// A domain event relayed to a client, tagged with its channel.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RelayEvent {
    /// Channel the event arrived on.
    #[schema(value_type = String)]
    pub channel: ChannelName,
    /// Serialized domain event.
    pub event: Value,
}

/// Per-client queue receiving [`RelayEvent`]s.
pub type EventSink = mpsc::Sender<RelayEvent>;

/// Which adapter a client wants to follow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "adapter", rename_all = "snake_case")]
pub enum ChannelRequest {
    /// Status updates of one booking.
    Booking {
        /// Booking id.
        booking_id: String,
    },
    /// Status updates of one trip.
    Trip {
        /// Trip id.
        trip_id: String,
    },
    /// Guide assignments of one trip.
    TripAssignment {
        /// Trip id.
        trip_id: String,
    },
    /// Balance of one wallet.
    WalletBalance {
        /// Wallet kind.
        wallet_type: WalletType,
        /// Wallet owner.
        user_id: String,
    },
    /// New ledger rows of one wallet.
    WalletTransactions {
        /// Wallet kind.
        wallet_type: WalletType,
        /// Wallet owner.
        user_id: String,
    },
    /// Availability of one package.
    Availability {
        /// Package id.
        package_id: String,
        /// Use the multi-package channel for this package.
        #[serde(default)]
        batched: bool,
    },
    /// Raw row changes for an arbitrary predicate.
    Raw {
        /// Channel name.
        name: String,
        /// Schema; the service default when omitted.
        #[serde(default)]
        schema: Option<String>,
        /// Table to follow.
        table: String,
        /// Event kind; every event when omitted.
        #[serde(default)]
        #[schema(value_type = Option<String>)]
        event: Option<ChangeEvent>,
        /// `column=op.value` filter.
        #[serde(default)]
        filter: Option<String>,
    },
}

/// Orchestrates the subscription pool and the in-process transport.
///
/// Clients subscribe through [`RealtimeService::subscribe`] and receive
/// serialized domain events on their sink. Row changes enter through
/// [`RealtimeService::ingest`]. Clients following the same channel share
/// one physical subscription.
#[derive(Debug, Clone)]
pub struct RealtimeService {
    pool: SubscriptionPool,
    transport: InMemoryTransport,
    schema: String,
}

impl RealtimeService {
    /// Creates a service over `transport`.
    #[must_use]
    pub fn new(transport: InMemoryTransport, retry: RetryPolicy, schema: impl Into<String>) -> Self {
        let pool = SubscriptionPool::with_retry(Arc::new(transport.clone()), retry);
        Self {
            pool,
            transport,
            schema: schema.into(),
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SubscriptionPool {
        &self.pool
    }

    /// Default schema for adapters and ingested changes.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Subscribes `sink` to the adapter named by `request`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad id, name, or filter, and
    /// propagates pool errors such as
    /// [`RealtimeError::ConfigMismatch`].
    pub fn subscribe(
        &self,
        request: ChannelRequest,
        sink: EventSink,
    ) -> Result<Subscription, RealtimeError> {
        match request {
            ChannelRequest::Booking { booking_id } => {
                self.relay(self.scoped(BookingSync::new(booking_id)), sink)
            }
            ChannelRequest::Trip { trip_id } => {
                self.relay(self.scoped(TripStatusSync::new(trip_id)), sink)
            }
            ChannelRequest::TripAssignment { trip_id } => {
                self.relay(self.scoped(TripAssignmentSync::new(trip_id)), sink)
            }
            ChannelRequest::WalletBalance {
                wallet_type,
                user_id,
            } => self.relay(
                self.scoped(WalletBalanceSync::new(wallet_type, user_id)),
                sink,
            ),
            ChannelRequest::WalletTransactions {
                wallet_type,
                user_id,
            } => self.relay(
                self.scoped(WalletTransactionSync::new(wallet_type, user_id)),
                sink,
            ),
            ChannelRequest::Availability {
                package_id,
                batched,
            } => {
                let adapter = if batched {
                    AvailabilitySync::batched(package_id)
                } else {
                    AvailabilitySync::new(package_id)
                };
                self.relay(self.scoped(adapter), sink)
            }
            ChannelRequest::Raw {
                name,
                schema,
                table,
                event,
                filter,
            } => {
                let name = ChannelName::new(name)?;
                let mut config = ChannelConfig::new(table, event.unwrap_or(ChangeEvent::All))
                    .with_schema(schema.unwrap_or_else(|| self.schema.clone()));
                if let Some(filter) = filter {
                    config = config.with_filter(&filter)?;
                }
                self.relay(RawSync::new(name, config), sink)
            }
        }
    }

    /// Publishes a row change to every matching channel. Returns the
    /// number of physical subscriptions it reached.
    pub fn ingest(&self, change: &RowChange<Value>) -> usize {
        let delivered = self.transport.publish(change);
        tracing::debug!(
            table = change.table(),
            event = %change.event(),
            delivered,
            "row change ingested"
        );
        delivered
    }

    /// Summaries of every pooled channel.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelSummary> {
        self.pool.snapshot()
    }

    /// Summary of one channel.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] or
    /// [`RealtimeError::ChannelNotFound`].
    pub fn channel(&self, name: &str) -> Result<ChannelSummary, RealtimeError> {
        let name = ChannelName::new(name)?;
        self.pool
            .get(&name)
            .map(|channel| ChannelSummary::from(channel.as_ref()))
            .ok_or_else(|| RealtimeError::ChannelNotFound(name.to_string()))
    }

    /// Force-closes a channel for every listener.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] or
    /// [`RealtimeError::ChannelNotFound`].
    pub fn close_channel(&self, name: &str) -> Result<(), RealtimeError> {
        let name = ChannelName::new(name)?;
        self.pool.close_channel(&name)?;
        tracing::info!(channel = %name, "channel closed by request");
        Ok(())
    }

    /// Closes every channel. Returns how many were open.
    pub fn shutdown(&self) -> usize {
        self.pool.close_all()
    }

    fn scoped<A: DomainAdapter>(&self, adapter: A) -> InSchema<A> {
        InSchema::new(adapter, self.schema.as_str())
    }

    fn relay<A>(&self, adapter: A, sink: EventSink) -> Result<Subscription, RealtimeError>
    where
        A: DomainAdapter,
        A::Event: Serialize,
    {
        let channel = adapter.channel_name()?;
        let callback = event_callback(move |event: A::Event| {
            let event = serde_json::to_value(&event)?;
            forward(
                &sink,
                RelayEvent {
                    channel: channel.clone(),
                    event,
                },
            )
        });
        sync::subscribe(&self.pool, adapter, callback)
    }
}

/// Queues an event on a client sink. A full sink drops the event; a
/// closed one is an error.
fn forward(sink: &EventSink, event: RelayEvent) -> anyhow::Result<()> {
    match sink.try_send(event) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(channel = %dropped.channel, "client queue full, dropping event");
            Ok(())
        }
        Err(TrySendError::Closed(_)) => anyhow::bail!("client queue closed"),
    }
}
