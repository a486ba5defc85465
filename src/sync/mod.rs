//! Domain sync adapters.
//!
//! Each adapter fixes a channel name, a [`ChannelConfig`], and a
//! transform from raw [`RowChange`]s to a typed event. The helpers here
//! bind adapters to the subscription pool:
//!
//! | Helper | Lifetime |
//! |--------|----------|
//! | [`subscribe`] | explicit `unsubscribe` |
//! | [`subscribe_many`] | [`SubscriptionGroup`], released on drop |
//! | [`AdapterHook`] | single hook, released on drop |
//! | [`multi_hook`] | one hook entry per adapter |
//!
//! Adapters never retry. Transform errors are reported through the
//! channel's callback-failure path, creation errors through the hook
//! `error` state.

pub mod availability;
pub mod booking;
pub mod raw;
pub mod trip;
pub mod wallet;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::{ChannelConfig, ChannelName, RowChange};
use crate::error::RealtimeError;
use crate::realtime::{
    Listener, MultiSubscriptionHook, Subscription, SubscriptionHook, SubscriptionPool,
    SubscriptionSpec, SubscriptionState, listener,
};

pub use availability::{AvailabilitySync, AvailabilityUpdate};
pub use booking::{Booking, BookingSync};
pub use raw::RawSync;
pub use trip::{Trip, TripAssignment, TripAssignmentChange, TripAssignmentSync, TripStatusSync};
pub use wallet::{
    WalletBalance, WalletBalanceSync, WalletTransaction, WalletTransactionSync, WalletType,
};

/// A fixed subscription target plus a payload transform.
pub trait DomainAdapter: Send + Sync + 'static {
    /// Typed event produced by [`Self::transform`].
    type Event: Send + 'static;

    /// Name of the channel this adapter subscribes to.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] if the adapter's id
    /// is empty.
    fn channel_name(&self) -> Result<ChannelName, RealtimeError>;

    /// Table, event, and filter for the channel.
    fn channel_config(&self) -> ChannelConfig;

    /// Projects a row change into a domain event. `Ok(None)` skips the
    /// change.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Decode`] if the row does not fit the
    /// domain type.
    fn transform(&self, change: &RowChange<Value>) -> Result<Option<Self::Event>, RealtimeError>;
}

/// Runs an adapter against a schema other than `public`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InSchema<A> {
    inner: A,
    schema: String,
}

impl<A: DomainAdapter> InSchema<A> {
    /// Wraps `inner` so its channel targets `schema`.
    #[must_use]
    pub fn new(inner: A, schema: impl Into<String>) -> Self {
        Self {
            inner,
            schema: schema.into(),
        }
    }
}

impl<A: DomainAdapter> DomainAdapter for InSchema<A> {
    type Event = A::Event;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        self.inner.channel_name()
    }

    fn channel_config(&self) -> ChannelConfig {
        self.inner.channel_config().with_schema(self.schema.as_str())
    }

    fn transform(&self, change: &RowChange<Value>) -> Result<Option<Self::Event>, RealtimeError> {
        self.inner.transform(change)
    }
}

/// Callback receiving an adapter's domain events.
pub type EventCallback<E> = Arc<dyn Fn(E) -> anyhow::Result<()> + Send + Sync>;

/// Boxes a closure as an [`EventCallback`].
pub fn event_callback<E, F>(f: F) -> EventCallback<E>
where
    F: Fn(E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps an adapter and a callback into a raw row-change [`Listener`].
pub fn adapter_listener<A: DomainAdapter>(
    adapter: Arc<A>,
    callback: EventCallback<A::Event>,
) -> Listener {
    listener(move |change| match adapter.transform(change)? {
        Some(event) => callback(event),
        None => Ok(()),
    })
}

/// Subscribes `callback` to `adapter`'s channel.
///
/// # Errors
///
/// Propagates channel-name and pool creation errors.
pub fn subscribe<A: DomainAdapter>(
    pool: &SubscriptionPool,
    adapter: A,
    callback: EventCallback<A::Event>,
) -> Result<Subscription, RealtimeError> {
    let name = adapter.channel_name()?;
    let config = adapter.channel_config();
    pool.get_or_create(name, config, adapter_listener(Arc::new(adapter), callback))
}

/// Subscribes one pool entry per adapter. If any entry fails, the entries
/// created so far are released and the error is returned.
///
/// # Errors
///
/// Returns the first channel-name or pool creation error.
pub fn subscribe_many<A, I>(
    pool: &SubscriptionPool,
    adapters: I,
    callback: &EventCallback<A::Event>,
) -> Result<SubscriptionGroup, RealtimeError>
where
    A: DomainAdapter,
    I: IntoIterator<Item = A>,
{
    let mut group = SubscriptionGroup::default();
    for adapter in adapters {
        match subscribe(pool, adapter, Arc::clone(callback)) {
            Ok(subscription) => group.subscriptions.push(subscription),
            Err(err) => {
                tracing::warn!(
                    created = group.len(),
                    error = %err,
                    "rolling back partial subscription group"
                );
                group.unsubscribe_all();
                return Err(err);
            }
        }
    }
    Ok(group)
}

/// Subscriptions created together by [`subscribe_many`]. Dropping the
/// group unsubscribes every member.
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    /// Member subscriptions, in creation order.
    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Channel names of the members.
    #[must_use]
    pub fn channel_names(&self) -> Vec<ChannelName> {
        self.subscriptions
            .iter()
            .map(|s| s.channel_name().clone())
            .collect()
    }

    /// `true` if every member is subscribed.
    #[must_use]
    pub fn all_subscribed(&self) -> bool {
        self.subscriptions.iter().all(Subscription::is_subscribed)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// `true` if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Unsubscribes every member. Idempotent.
    pub fn unsubscribe_all(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// [`SubscriptionHook`] specialised to a domain adapter.
pub struct AdapterHook<A: DomainAdapter> {
    adapter: Arc<A>,
    callback: EventCallback<A::Event>,
    hook: SubscriptionHook,
}

impl<A: DomainAdapter> AdapterHook<A> {
    /// Mounts a hook for `adapter`, subscribing if `enabled`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] if the adapter's id
    /// is empty. Pool creation errors are reported through
    /// [`Self::state`] instead.
    pub fn mount(
        pool: &SubscriptionPool,
        adapter: A,
        callback: EventCallback<A::Event>,
        enabled: bool,
    ) -> Result<Self, RealtimeError> {
        let name = adapter.channel_name()?;
        let config = adapter.channel_config();
        let adapter = Arc::new(adapter);
        let raw = adapter_listener(Arc::clone(&adapter), Arc::clone(&callback));
        Ok(Self {
            hook: SubscriptionHook::mount(pool, name, config, raw, enabled),
            adapter,
            callback,
        })
    }

    /// Replaces the callback without resubscribing.
    pub fn set_callback(&mut self, callback: EventCallback<A::Event>) {
        self.hook.set_callback(adapter_listener(
            Arc::clone(&self.adapter),
            Arc::clone(&callback),
        ));
        self.callback = callback;
    }

    /// Points the hook at another adapter instance (e.g. a new booking
    /// id). Resubscribes only if the channel name, config, or enabled flag
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] if the new id is
    /// empty; the hook keeps its previous target in that case.
    pub fn set_adapter(&mut self, adapter: A, enabled: bool) -> Result<(), RealtimeError> {
        let name = adapter.channel_name()?;
        let config = adapter.channel_config();
        self.adapter = Arc::new(adapter);
        self.hook.set_callback(adapter_listener(
            Arc::clone(&self.adapter),
            Arc::clone(&self.callback),
        ));
        self.hook.update(name, config, enabled);
        Ok(())
    }

    /// Enables or disables the hook.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.hook.set_enabled(enabled);
    }

    /// Current adapter.
    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Current status snapshot.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.hook.state()
    }

    /// Shorthand for `state().is_subscribed`.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.hook.is_subscribed()
    }

    /// Shorthand for `state().error`.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.hook.error()
    }

    /// Receiver notified whenever the status changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.hook.watch()
    }

    /// Channel name currently targeted.
    #[must_use]
    pub fn channel_name(&self) -> &ChannelName {
        self.hook.channel_name()
    }

    /// Tears the hook down. Equivalent to dropping it.
    pub fn unmount(self) {
        self.hook.unmount();
    }
}

impl<A: DomainAdapter> fmt::Debug for AdapterHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterHook")
            .field("hook", &self.hook)
            .finish_non_exhaustive()
    }
}

/// Mounts a [`MultiSubscriptionHook`] with one entry per adapter, all
/// sharing `callback`.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidChannelName`] if any adapter's id is
/// empty; nothing is subscribed in that case.
pub fn multi_hook<A, I>(
    pool: &SubscriptionPool,
    adapters: I,
    callback: &EventCallback<A::Event>,
    enabled: bool,
) -> Result<MultiSubscriptionHook, RealtimeError>
where
    A: DomainAdapter,
    I: IntoIterator<Item = A>,
{
    let specs = adapters
        .into_iter()
        .map(|adapter| {
            let name = adapter.channel_name()?;
            let config = adapter.channel_config();
            let raw = adapter_listener(Arc::new(adapter), Arc::clone(callback));
            Ok(SubscriptionSpec::new(name, config, raw))
        })
        .collect::<Result<Vec<_>, RealtimeError>>()?;
    Ok(MultiSubscriptionHook::mount(pool, specs, enabled))
}

/// Decodes a row snapshot into `T`, tagging failures with the channel and
/// table.
pub(crate) fn decode_row<T: DeserializeOwned>(
    channel: &str,
    change: &RowChange<Value>,
    row: &Value,
) -> Result<T, RealtimeError> {
    T::deserialize(row).map_err(|source| RealtimeError::Decode {
        channel: channel.to_string(),
        table: change.table().to_string(),
        source,
    })
}

/// Renders a JSON scalar id (string or number) as a string.
pub(crate) fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::realtime::test_support::eventually;
    use crate::transport::InMemoryTransport;

    fn pool(transport: &InMemoryTransport) -> SubscriptionPool {
        SubscriptionPool::new(Arc::new(transport.clone()))
    }

    fn collecting(sink: &Arc<Mutex<Vec<Booking>>>) -> EventCallback<Booking> {
        let sink = Arc::clone(sink);
        event_callback(move |booking| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(booking);
            }
            Ok(())
        })
    }

    fn received(sink: &Arc<Mutex<Vec<Booking>>>) -> usize {
        sink.lock().map(|g| g.len()).unwrap_or_default()
    }

    #[tokio::test]
    async fn subscribe_many_creates_one_entry_per_id() {
        let transport = InMemoryTransport::new();
        let pool = pool(&transport);
        let sink = Arc::new(Mutex::new(Vec::new()));

        let Ok(group) = subscribe_many(
            &pool,
            ["B1", "B2", "B3"].map(BookingSync::new),
            &collecting(&sink),
        ) else {
            panic!("group should subscribe");
        };
        assert_eq!(group.len(), 3);
        assert_eq!(pool.len(), 3);
        assert!(eventually(|| group.all_subscribed()).await);

        transport.publish(&RowChange::update(
            "bookings",
            json!({"id": "B2", "status": "confirmed"}),
            json!({"id": "B2", "status": "pending"}),
        ));
        assert!(eventually(|| received(&sink) == 1).await);

        drop(group);
        assert!(pool.is_empty());
        assert_eq!(transport.close_count(), 3);
    }

    #[tokio::test]
    async fn subscribe_many_rolls_back_on_failure() {
        let transport = InMemoryTransport::new();
        let pool = pool(&transport);
        let sink = Arc::new(Mutex::new(Vec::new()));

        let result = subscribe_many(
            &pool,
            ["B1", "", "B3"].map(BookingSync::new),
            &collecting(&sink),
        );
        assert!(matches!(result, Err(RealtimeError::InvalidChannelName(_))));
        assert!(pool.is_empty());
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn adapter_hook_follows_adapter_changes() {
        let transport = InMemoryTransport::new();
        let pool = pool(&transport);
        let sink = Arc::new(Mutex::new(Vec::new()));

        let Ok(mut hook) =
            AdapterHook::mount(&pool, BookingSync::new("B1"), collecting(&sink), true)
        else {
            panic!("hook should mount");
        };
        assert!(eventually(|| hook.is_subscribed()).await);

        let Ok(()) = hook.set_adapter(BookingSync::new("B2"), true) else {
            panic!("retarget should succeed");
        };
        assert_eq!(hook.channel_name().as_str(), "booking-B2");
        assert!(eventually(|| hook.is_subscribed()).await);

        transport.publish(&RowChange::update(
            "bookings",
            json!({"id": "B2", "status": "cancelled"}),
            json!({"id": "B2", "status": "pending"}),
        ));
        assert!(eventually(|| received(&sink) == 1).await);

        assert!(hook.set_adapter(BookingSync::new(" "), true).is_err());
        assert_eq!(hook.channel_name().as_str(), "booking-B2");

        hook.unmount();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn decode_failures_count_as_callback_failures() {
        let transport = InMemoryTransport::new();
        let pool = pool(&transport);
        let sink = Arc::new(Mutex::new(Vec::new()));
        let Ok(subscription) = subscribe(&pool, BookingSync::new("B1"), collecting(&sink)) else {
            panic!("subscribe should succeed");
        };
        assert!(eventually(|| subscription.is_subscribed()).await);

        // `id` filter matches but the row is not a booking object.
        transport.publish(&RowChange::update(
            "bookings",
            json!({"id": "B1", "status": 42}),
            json!({"id": "B1"}),
        ));
        assert!(eventually(|| subscription.channel().callback_failures() == 1).await);
        assert_eq!(received(&sink), 0);
        subscription.unsubscribe();
    }

    #[test]
    fn in_schema_only_changes_the_schema() {
        let plain = BookingSync::new("B1");
        let scoped = InSchema::new(BookingSync::new("B1"), "travel");
        assert_eq!(
            scoped.channel_config(),
            plain.channel_config().with_schema("travel")
        );
        assert_eq!(scoped.channel_name().ok(), plain.channel_name().ok());
    }

    #[test]
    fn id_string_accepts_strings_and_numbers() {
        assert_eq!(id_string(Some(&json!("a"))), Some("a".to_string()));
        assert_eq!(id_string(Some(&json!(7))), Some("7".to_string()));
        assert_eq!(id_string(Some(&json!(null))), None);
        assert_eq!(id_string(None), None);
    }
}
