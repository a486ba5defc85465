//! Channel wrapper around one physical subscription.
//!
//! A [`RealtimeChannel`] owns the transport handle and a dispatcher task
//! that drains the transport queue in order. Every row change is handed
//! to each registered listener through a guarded call: an `Err` or a panic
//! from one listener is logged and counted, and delivery continues.
//!
//! Connection state is published through a [`tokio::sync::watch`]
//! channel, so consumers can either query it ([`RealtimeChannel::is_subscribed`])
//! or await transitions ([`RealtimeChannel::watch_state`]).

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::RetryPolicy;
use crate::domain::{ChannelConfig, ChannelName, ChannelState, RowChange, TransportStatus};
use crate::error::RealtimeError;
use crate::transport::{Transport, TransportHandle, TransportMessage};

/// Callback signature for raw row changes.
pub type ListenerFn = dyn Fn(&RowChange<Value>) -> anyhow::Result<()> + Send + Sync;

/// Shared listener registered on a channel.
pub type Listener = Arc<ListenerFn>;

/// Boxes a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&RowChange<Value>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle identifying one listener on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Shared {
    name: ChannelName,
    config: ChannelConfig,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    state: watch::Sender<ChannelState>,
    handle: Mutex<Option<Box<dyn TransportHandle>>>,
    closed: AtomicBool,
    delivered: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> MutexGuard<'_, Option<Box<dyn TransportHandle>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ChannelState) {
        if self.is_closed() {
            return;
        }
        self.state.send_replace(state);
    }

    /// Installs the handle of a reopened subscription. A channel closed
    /// in the meantime gets the new handle closed right away.
    fn replace_handle(&self, handle: Box<dyn TransportHandle>) -> bool {
        let mut slot = self.handle();
        if self.is_closed() {
            handle.close();
            return false;
        }
        if let Some(previous) = slot.replace(handle) {
            previous.close();
        }
        true
    }

    fn log_status(&self, status: &TransportStatus) {
        let table = self.config.table();
        match status {
            TransportStatus::Subscribed => {
                tracing::debug!(channel = %self.name, table, "channel subscribed");
            }
            TransportStatus::ChannelError(reason) => {
                tracing::error!(channel = %self.name, table, reason = %reason, "channel error");
            }
            TransportStatus::TimedOut => {
                tracing::warn!(channel = %self.name, table, "channel subscription timed out");
            }
            TransportStatus::Closed => {
                tracing::debug!(channel = %self.name, table, "channel closed by transport");
            }
        }
    }

    fn deliver(&self, change: &RowChange<Value>) {
        let listeners = self.listeners().clone();
        self.delivered.fetch_add(1, Ordering::Relaxed);
        for (id, listener) in &listeners {
            self.invoke_guarded(*id, listener, change);
        }
    }

    fn invoke_guarded(&self, id: ListenerId, listener: &Listener, change: &RowChange<Value>) {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| listener(change))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            channel = %self.name,
            table = self.config.table(),
            event = %change.event(),
            listener = %id,
            error = %failure,
            "realtime callback failed"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("callback panicked: {s}")
    } else {
        "callback panicked".to_string()
    }
}

/// One physical subscription plus its ordered listener list.
///
/// Created and owned by [`super::SubscriptionPool`]; consumers reach it
/// through [`super::Subscription::channel`].
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Opens the physical subscription and starts the dispatcher.
    pub(crate) fn open(
        transport: Arc<dyn Transport>,
        name: ChannelName,
        config: ChannelConfig,
        retry: RetryPolicy,
    ) -> Result<Self, RealtimeError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
        let opened = transport.open(&name, &config)?;

        let (state, _) = watch::channel(ChannelState::Joining);
        let shared = Arc::new(Shared {
            name,
            config,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            state,
            handle: Mutex::new(Some(opened.handle)),
            closed: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let task = runtime.spawn(dispatch(
            Arc::clone(&shared),
            transport,
            opened.messages,
            retry,
        ));

        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Returns the channel name.
    #[must_use]
    pub fn name(&self) -> &ChannelName {
        &self.shared.name
    }

    /// Returns the predicate the channel was opened with.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Point-in-time connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.shared.state.borrow().clone()
    }

    /// `true` while the transport reports the subscription as joined.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.shared.state.borrow().is_subscribed()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners().len()
    }

    /// Number of row changes dispatched so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Number of listener invocations that returned an error or panicked.
    #[must_use]
    pub fn callback_failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// `true` once [`Self::close`] ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub(crate) fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
        self.shared.listeners().push((id, listener));
        id
    }

    /// Removes a listener and returns how many remain.
    pub(crate) fn remove_listener(&self, id: ListenerId) -> usize {
        let mut listeners = self.shared.listeners();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len()
    }

    /// Stops the dispatcher and closes the physical subscription.
    pub(crate) fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if let Some(handle) = self.shared.handle().take() {
            handle.close();
        }
        self.shared.listeners().clear();
        self.shared.state.send_replace(ChannelState::Closed);
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("state", &*self.shared.state.borrow())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

/// Drains transport messages until the subscription ends, reopening it
/// under `retry` after `CHANNEL_ERROR` / `TIMED_OUT`.
async fn dispatch(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    mut messages: mpsc::UnboundedReceiver<TransportMessage>,
    retry: RetryPolicy,
) {
    let mut attempt: u32 = 0;
    loop {
        let Some(failure) = pump(&shared, &mut messages, &mut attempt).await else {
            return;
        };
        if shared.is_closed() {
            return;
        }

        let reopened = loop {
            attempt = attempt.saturating_add(1);
            let Some(delay) = retry.delay_for(attempt) else {
                break None;
            };
            shared.set_state(ChannelState::Reconnecting { attempt });
            tracing::warn!(
                channel = %shared.name,
                table = shared.config.table(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting channel"
            );
            tokio::time::sleep(delay).await;
            if shared.is_closed() {
                return;
            }
            match transport.open(&shared.name, &shared.config) {
                Ok(opened) => break Some(opened),
                Err(err) => tracing::error!(
                    channel = %shared.name,
                    table = shared.config.table(),
                    attempt,
                    error = %err,
                    "channel reopen failed"
                ),
            }
        };

        let Some(opened) = reopened else {
            if retry.is_enabled() {
                tracing::error!(
                    channel = %shared.name,
                    table = shared.config.table(),
                    "reconnect attempts exhausted"
                );
            }
            shared.set_state(failure);
            return;
        };
        if !shared.replace_handle(opened.handle) {
            return;
        }
        messages = opened.messages;
        shared.set_state(ChannelState::Joining);
    }
}

/// Forwards messages from one physical subscription. Returns the failure
/// state when the transport reports `CHANNEL_ERROR` / `TIMED_OUT`, `None`
/// when the subscription ended.
async fn pump(
    shared: &Shared,
    messages: &mut mpsc::UnboundedReceiver<TransportMessage>,
    attempt: &mut u32,
) -> Option<ChannelState> {
    while let Some(message) = messages.recv().await {
        match message {
            TransportMessage::Change(change) => shared.deliver(&change),
            TransportMessage::Status(status) => {
                shared.log_status(&status);
                let state = ChannelState::from(&status);
                shared.set_state(state.clone());
                match status {
                    TransportStatus::Subscribed => *attempt = 0,
                    TransportStatus::ChannelError(_) | TransportStatus::TimedOut => {
                        return Some(state);
                    }
                    TransportStatus::Closed => return None,
                }
            }
        }
    }
    shared.set_state(ChannelState::Closed);
    None
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::domain::ChangeEvent;
    use crate::realtime::test_support::{channel_name, eventually};
    use crate::transport::InMemoryTransport;

    fn open(transport: &InMemoryTransport, retry: RetryPolicy) -> RealtimeChannel {
        let transport: Arc<dyn Transport> = Arc::new(transport.clone());
        let Ok(channel) = RealtimeChannel::open(
            transport,
            channel_name("trip-T1"),
            ChannelConfig::new("trips", ChangeEvent::All),
            retry,
        ) else {
            panic!("open failed");
        };
        channel
    }

    #[test]
    fn open_outside_runtime_fails() {
        let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new());
        let result = RealtimeChannel::open(
            transport,
            channel_name("trip-T1"),
            ChannelConfig::new("trips", ChangeEvent::All),
            RetryPolicy::disabled(),
        );
        assert!(matches!(result, Err(RealtimeError::NoRuntime)));
    }

    #[tokio::test]
    async fn failing_and_panicking_listeners_do_not_stop_delivery() {
        let transport = InMemoryTransport::new();
        let channel = open(&transport, RetryPolicy::disabled());
        let seen = Arc::new(AtomicU64::new(0));

        channel.add_listener(listener(|_| anyhow::bail!("boom")));
        channel.add_listener(listener(|_| panic!("listener exploded")));
        let counter = Arc::clone(&seen);
        channel.add_listener(listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        transport.publish(&RowChange::insert("trips", json!({"id": "T1"})));
        transport.publish(&RowChange::insert("trips", json!({"id": "T2"})));

        assert!(eventually(|| seen.load(Ordering::SeqCst) == 2).await);
        assert_eq!(channel.delivered(), 2);
        assert_eq!(channel.callback_failures(), 4);
    }

    #[tokio::test]
    async fn state_follows_transport_status() {
        let transport = InMemoryTransport::manual();
        let channel = open(&transport, RetryPolicy::disabled());
        assert_eq!(channel.state(), ChannelState::Joining);

        transport.emit_status(channel.name(), &TransportStatus::Subscribed);
        assert!(eventually(|| channel.is_subscribed()).await);

        transport.emit_status(channel.name(), &TransportStatus::TimedOut);
        assert!(eventually(|| channel.state() == ChannelState::TimedOut).await);
        assert!(!channel.state().is_live());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = InMemoryTransport::new();
        let channel = open(&transport, RetryPolicy::disabled());
        channel.close();
        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn retry_reopens_after_channel_error() {
        let transport = InMemoryTransport::new();
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        };
        let channel = open(&transport, retry);
        assert!(eventually(|| channel.is_subscribed()).await);

        transport.emit_status(
            channel.name(),
            &TransportStatus::ChannelError("replication slot lost".to_string()),
        );

        assert!(eventually(|| transport.open_count() == 2).await);
        assert!(eventually(|| channel.is_subscribed()).await);
        assert_eq!(transport.active_count(), 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retry_leaves_failure_state() {
        let transport = InMemoryTransport::manual();
        let retry = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(5),
        };
        let channel = open(&transport, retry);

        transport.emit_status(channel.name(), &TransportStatus::TimedOut);
        assert!(eventually(|| transport.open_count() == 2).await);

        transport.emit_status(channel.name(), &TransportStatus::TimedOut);
        assert!(eventually(|| channel.state() == ChannelState::TimedOut).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.open_count(), 2);
        assert!(!channel.state().is_live());
    }
}
