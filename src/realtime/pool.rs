//! Subscription pool: one physical subscription per channel name.
//!
//! [`SubscriptionPool`] maps [`ChannelName`]s to live [`RealtimeChannel`]s.
//! Every get-or-create and release decision runs under the same mutex, so
//! concurrent callers asking for the same name share one physical
//! subscription. Each caller gets its own [`Subscription`] handle with its
//! own listener; the channel is closed and removed when the last handle
//! unsubscribes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

use super::channel::{Listener, ListenerId, RealtimeChannel};
use super::RetryPolicy;
use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, ChannelState};
use crate::error::RealtimeError;
use crate::transport::Transport;

#[derive(Debug)]
struct PoolInner {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    channels: Mutex<HashMap<ChannelName, Arc<RealtimeChannel>>>,
}

/// Registry of live channels keyed by name.
///
/// Cheap to clone; clones share the same registry. Construct one per
/// application context and inject it where subscriptions are made.
#[derive(Debug, Clone)]
pub struct SubscriptionPool {
    inner: Arc<PoolInner>,
}

/// Introspection snapshot of one pooled channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    /// Channel name.
    pub name: ChannelName,
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
    /// Registered listeners.
    pub listeners: usize,
    /// Row changes dispatched so far.
    pub delivered: u64,
    /// Listener invocations that failed.
    pub callback_failures: u64,
}

impl From<&RealtimeChannel> for ChannelSummary {
    fn from(channel: &RealtimeChannel) -> Self {
        let config = channel.config();
        Self {
            name: channel.name().clone(),
            schema: config.schema().to_string(),
            table: config.table().to_string(),
            event: config.event(),
            filter: config.filter().map(ToString::to_string),
            state: channel.state(),
            listeners: channel.listener_count(),
            delivered: channel.delivered(),
            callback_failures: channel.callback_failures(),
        }
    }
}

impl SubscriptionPool {
    /// Creates an empty pool over `transport`, without reconnects.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_retry(transport, RetryPolicy::disabled())
    }

    /// Creates an empty pool whose channels reconnect under `retry`.
    #[must_use]
    pub fn with_retry(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                transport,
                retry,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<ChannelName, Arc<RealtimeChannel>>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a subscription on `name`, opening the physical subscription
    /// only if no live channel exists under that name.
    ///
    /// A live channel (joining, joined, or reconnecting) is reused and
    /// `listener` is appended to its listener list. A dead channel (errored,
    /// timed out, closed) is closed and replaced.
    ///
    /// # Errors
    ///
    /// - [`RealtimeError::ConfigMismatch`] if a live channel exists under
    ///   `name` with a different config.
    /// - [`RealtimeError::TransportUnavailable`] or
    ///   [`RealtimeError::NoRuntime`] if the channel cannot be opened.
    pub fn get_or_create(
        &self,
        name: ChannelName,
        config: ChannelConfig,
        listener: Listener,
    ) -> Result<Subscription, RealtimeError> {
        let mut channels = self.channels();

        if let Some(existing) = channels.get(&name) {
            if existing.state().is_live() {
                if *existing.config() != config {
                    return Err(RealtimeError::ConfigMismatch {
                        name: name.to_string(),
                    });
                }
                let listener_id = existing.add_listener(listener);
                tracing::debug!(
                    channel = %name,
                    table = config.table(),
                    listeners = existing.listener_count(),
                    "reusing existing channel"
                );
                return Ok(Subscription::new(self.clone(), Arc::clone(existing), listener_id));
            }
            if let Some(stale) = channels.remove(&name) {
                tracing::debug!(
                    channel = %name,
                    state = ?stale.state(),
                    "replacing dead channel"
                );
                stale.close();
            }
        }

        let channel = Arc::new(RealtimeChannel::open(
            Arc::clone(&self.inner.transport),
            name.clone(),
            config,
            self.inner.retry,
        )?);
        let listener_id = channel.add_listener(listener);
        tracing::debug!(
            channel = %name,
            table = channel.config().table(),
            event = %channel.config().event(),
            "creating channel"
        );
        channels.insert(name, Arc::clone(&channel));
        Ok(Subscription::new(self.clone(), channel, listener_id))
    }

    /// Removes one listener; closes and unregisters the channel when it
    /// was the last one.
    fn release(&self, channel: &Arc<RealtimeChannel>, listener_id: ListenerId) {
        let mut channels = self.channels();
        let remaining = channel.remove_listener(listener_id);
        if remaining > 0 {
            tracing::debug!(
                channel = %channel.name(),
                listener = %listener_id,
                remaining,
                "listener removed"
            );
            return;
        }
        if channels
            .get(channel.name())
            .is_some_and(|current| Arc::ptr_eq(current, channel))
        {
            channels.remove(channel.name());
        }
        channel.close();
        tracing::debug!(
            channel = %channel.name(),
            table = channel.config().table(),
            "unsubscribed channel"
        );
    }

    /// Returns the channel registered under `name`.
    #[must_use]
    pub fn get(&self, name: &ChannelName) -> Option<Arc<RealtimeChannel>> {
        self.channels().get(name).cloned()
    }

    /// Returns `true` if a channel is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &ChannelName) -> bool {
        self.channels().contains_key(name)
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels().len()
    }

    /// `true` if no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels().is_empty()
    }

    /// Summaries of every registered channel, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChannelSummary> {
        let mut summaries: Vec<ChannelSummary> = self
            .channels()
            .values()
            .map(|channel| ChannelSummary::from(channel.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Closes a channel for every holder and unregisters it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ChannelNotFound`] if no channel is
    /// registered under `name`.
    pub fn close_channel(&self, name: &ChannelName) -> Result<(), RealtimeError> {
        let mut channels = self.channels();
        let channel = channels
            .remove(name)
            .ok_or_else(|| RealtimeError::ChannelNotFound(name.to_string()))?;
        channel.close();
        tracing::debug!(channel = %name, "channel force-closed");
        Ok(())
    }

    /// Closes every channel. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut channels = self.channels();
        let count = channels.len();
        for (_, channel) in channels.drain() {
            channel.close();
        }
        if count > 0 {
            tracing::debug!(count, "closed all channels");
        }
        count
    }
}

/// One caller's registration on a pooled channel.
///
/// Several `Subscription`s may share a [`RealtimeChannel`]; each owns
/// exactly one listener on it.
#[derive(Debug)]
pub struct Subscription {
    pool: SubscriptionPool,
    channel: Arc<RealtimeChannel>,
    listener_id: ListenerId,
    released: AtomicBool,
}

impl Subscription {
    fn new(pool: SubscriptionPool, channel: Arc<RealtimeChannel>, listener_id: ListenerId) -> Self {
        Self {
            pool,
            channel,
            listener_id,
            released: AtomicBool::new(false),
        }
    }

    /// Name of the underlying channel.
    #[must_use]
    pub fn channel_name(&self) -> &ChannelName {
        self.channel.name()
    }

    /// The shared channel behind this subscription.
    #[must_use]
    pub fn channel(&self) -> &Arc<RealtimeChannel> {
        &self.channel
    }

    /// This subscription's listener id on the channel.
    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// `true` while the channel is joined and this handle is not released.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        !self.is_released() && self.channel.is_subscribed()
    }

    /// Connection state of the underlying channel.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Receiver notified on every state transition of the channel.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.channel.watch_state()
    }

    /// `true` once [`Self::unsubscribe`] ran or the handle was dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Removes this subscription's listener. The physical subscription is
    /// closed when no listener remains. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!(channel = %self.channel.name(), "subscription already released");
            return;
        }
        self.pool.release(&self.channel, self.listener_id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
