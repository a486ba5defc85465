//! Lifecycle binding for a single subscription.
//!
//! [`SubscriptionHook`] subscribes when mounted or when its dependencies
//! (name, config, enabled flag) change, and unsubscribes when those
//! dependencies change again, when it is unmounted, or when it is
//! dropped. The callback lives in a [`CallbackSlot`], so replacing it
//! never forces a resubscription.
//!
//! Status reaches the hook by push: a watcher task follows the channel's
//! state and latches `is_subscribed = true` on the first confirmation.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::channel::{Listener, ListenerFn, listener};
use super::pool::{Subscription, SubscriptionPool};
use crate::domain::{ChannelConfig, ChannelName, ChannelState};
use crate::error::RealtimeError;

/// Consumer-facing status of a hook. A best-effort snapshot, not
/// authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SubscriptionState {
    /// `true` once the transport confirmed the subscription.
    pub is_subscribed: bool,
    /// Last creation or transport error, if any.
    pub error: Option<String>,
}

impl SubscriptionState {
    /// Confirmed state with no error.
    #[must_use]
    pub const fn subscribed() -> Self {
        Self {
            is_subscribed: true,
            error: None,
        }
    }

    /// Not-subscribed state carrying `error`.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            is_subscribed: false,
            error: Some(error.into()),
        }
    }
}

/// Shared slot holding the latest version of a callback.
pub struct CallbackSlot<T: ?Sized> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T: ?Sized> CallbackSlot<T> {
    /// Creates a slot holding `callback`.
    #[must_use]
    pub fn new(callback: Arc<T>) -> Self {
        Self {
            current: Arc::new(RwLock::new(callback)),
        }
    }

    /// Returns the current callback.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the callback; readers see it from their next call.
    pub fn set(&self, callback: Arc<T>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = callback;
    }
}

impl<T: ?Sized> Clone for CallbackSlot<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T: ?Sized> fmt::Debug for CallbackSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Active {
    subscription: Subscription,
    watcher: JoinHandle<()>,
}

/// One subscribe/teardown unit, shared by the single and multi hooks.
#[derive(Debug)]
pub(crate) struct HookSlot {
    name: ChannelName,
    config: ChannelConfig,
    callback: CallbackSlot<ListenerFn>,
    active: Option<Active>,
    state: Arc<watch::Sender<SubscriptionState>>,
}

impl HookSlot {
    pub(crate) fn new(name: ChannelName, config: ChannelConfig, callback: Listener) -> Self {
        let (state, _) = watch::channel(SubscriptionState::default());
        Self {
            name,
            config,
            callback: CallbackSlot::new(callback),
            active: None,
            state: Arc::new(state),
        }
    }

    pub(crate) fn name(&self) -> &ChannelName {
        &self.name
    }

    pub(crate) fn same_target(&self, name: &ChannelName, config: &ChannelConfig) -> bool {
        self.name == *name && self.config == *config
    }

    pub(crate) fn retarget(&mut self, name: ChannelName, config: ChannelConfig) {
        self.name = name;
        self.config = config;
    }

    pub(crate) fn set_callback(&self, callback: Listener) {
        self.callback.set(callback);
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    pub(crate) fn subscription(&self) -> Option<&Subscription> {
        self.active.as_ref().map(|active| &active.subscription)
    }

    pub(crate) fn is_observing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.watcher.is_finished())
    }

    /// Subscribes through the pool and starts following channel status.
    /// A creation failure is recorded in the state; there is no retry.
    pub(crate) fn start(&mut self, pool: &SubscriptionPool) {
        self.stop();

        // The watcher needs a runtime even when the pool reuses a channel.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.fail(&RealtimeError::NoRuntime);
            return;
        };

        let callback = self.callback.clone();
        let trampoline = listener(move |change| (callback.get())(change));
        match pool.get_or_create(self.name.clone(), self.config.clone(), trampoline) {
            Ok(subscription) => {
                let watcher = runtime.spawn(follow_status(
                    subscription.watch_state(),
                    Arc::clone(&self.state),
                    self.name.clone(),
                ));
                self.active = Some(Active {
                    subscription,
                    watcher,
                });
            }
            Err(err) => self.fail(&err),
        }
    }

    fn fail(&self, err: &RealtimeError) {
        tracing::warn!(
            channel = %self.name,
            table = self.config.table(),
            error = %err,
            "failed to create channel"
        );
        self.state.send_replace(SubscriptionState::failed(err.to_string()));
    }

    /// Stops the status watcher, releases the subscription, and resets
    /// the state to not-subscribed.
    pub(crate) fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.watcher.abort();
            active.subscription.unsubscribe();
            tracing::debug!(channel = %self.name, "hook torn down");
        }
        self.state.send_replace(SubscriptionState::default());
    }
}

/// Mirrors channel state into the hook state until the first
/// confirmation, which is latched.
async fn follow_status(
    mut channel_state: watch::Receiver<ChannelState>,
    state: Arc<watch::Sender<SubscriptionState>>,
    name: ChannelName,
) {
    loop {
        let current = channel_state.borrow_and_update().clone();
        if current.is_subscribed() {
            state.send_replace(SubscriptionState::subscribed());
            tracing::debug!(channel = %name, "hook subscribed");
            return;
        }
        if let Some(message) = current.error_message() {
            state.send_if_modified(|s| {
                if s.error.as_deref() == Some(message.as_str()) {
                    return false;
                }
                s.error = Some(message);
                true
            });
        }
        if current == ChannelState::Closed || channel_state.changed().await.is_err() {
            return;
        }
    }
}

/// Subscription bound to a setup/teardown scope.
///
/// ```ignore
/// let mut hook = SubscriptionHook::mount(&pool, name, config, on_change, true);
/// hook.set_callback(new_on_change);        // no resubscription
/// hook.update(other_name, config, true);   // tears down, subscribes again
/// drop(hook);                              // unsubscribes
/// ```
#[derive(Debug)]
pub struct SubscriptionHook {
    pool: SubscriptionPool,
    slot: HookSlot,
    enabled: bool,
}

impl SubscriptionHook {
    /// Creates the hook and subscribes if `enabled`.
    #[must_use]
    pub fn mount(
        pool: &SubscriptionPool,
        name: ChannelName,
        config: ChannelConfig,
        callback: Listener,
        enabled: bool,
    ) -> Self {
        let mut hook = Self {
            pool: pool.clone(),
            slot: HookSlot::new(name, config, callback),
            enabled,
        };
        if enabled {
            hook.slot.start(&hook.pool);
        }
        hook
    }

    /// Replaces the callback without resubscribing.
    pub fn set_callback(&self, callback: Listener) {
        self.slot.set_callback(callback);
    }

    /// Applies new dependencies. Resubscribes only if the name, config,
    /// or enabled flag changed.
    pub fn update(&mut self, name: ChannelName, config: ChannelConfig, enabled: bool) {
        if self.enabled == enabled && self.slot.same_target(&name, &config) {
            return;
        }
        self.slot.stop();
        self.slot.retarget(name, config);
        self.enabled = enabled;
        if enabled {
            self.slot.start(&self.pool);
        }
    }

    /// Toggles the hook, keeping name and config.
    pub fn set_enabled(&mut self, enabled: bool) {
        let name = self.slot.name.clone();
        let config = self.slot.config.clone();
        self.update(name, config, enabled);
    }

    /// Current status snapshot.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.slot.state()
    }

    /// Shorthand for `state().is_subscribed`.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.slot.state().is_subscribed
    }

    /// Shorthand for `state().error`.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.slot.state().error
    }

    /// Receiver notified whenever the status changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.slot.watch()
    }

    /// Channel name currently targeted.
    #[must_use]
    pub fn channel_name(&self) -> &ChannelName {
        self.slot.name()
    }

    /// Subscription currently held, if any.
    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        self.slot.subscription()
    }

    /// `true` while a status watcher task is running.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.slot.is_observing()
    }

    /// Tears the hook down. Equivalent to dropping it.
    pub fn unmount(mut self) {
        self.slot.stop();
    }
}

impl Drop for SubscriptionHook {
    fn drop(&mut self) {
        self.slot.stop();
    }
}
