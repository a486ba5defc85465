//! Lifecycle binding for a list of subscriptions.
//!
//! [`MultiSubscriptionHook`] applies the [`super::SubscriptionHook`]
//! discipline to a whole list: replacing the list tears every entry down
//! and subscribes the new list, while per-index callback slots let callers
//! swap callbacks without resubscribing. Entries are independent: a
//! failing callback or a failed creation affects only its own entry.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use super::channel::Listener;
use super::hook::{HookSlot, SubscriptionState};
use super::pool::SubscriptionPool;
use crate::domain::{ChannelConfig, ChannelName};

/// One entry of a [`MultiSubscriptionHook`].
#[derive(Clone)]
pub struct SubscriptionSpec {
    /// Channel name.
    pub name: ChannelName,
    /// Channel predicate.
    pub config: ChannelConfig,
    /// Callback for this entry.
    pub callback: Listener,
}

impl SubscriptionSpec {
    /// Builds an entry.
    #[must_use]
    pub fn new(name: ChannelName, config: ChannelConfig, callback: Listener) -> Self {
        Self {
            name,
            config,
            callback,
        }
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Status of one entry, keyed by channel name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EntryStatus {
    /// Channel name of the entry.
    #[schema(value_type = String)]
    pub name: ChannelName,
    /// `true` once the entry's channel was confirmed.
    pub is_subscribed: bool,
    /// Last creation or transport error for the entry.
    pub error: Option<String>,
}

/// A list of subscriptions sharing one setup/teardown scope.
#[derive(Debug)]
pub struct MultiSubscriptionHook {
    pool: SubscriptionPool,
    slots: Vec<HookSlot>,
    enabled: bool,
}

impl MultiSubscriptionHook {
    /// Creates the hook and subscribes every entry if `enabled`.
    #[must_use]
    pub fn mount(pool: &SubscriptionPool, specs: Vec<SubscriptionSpec>, enabled: bool) -> Self {
        let mut hook = Self {
            pool: pool.clone(),
            slots: Vec::new(),
            enabled,
        };
        hook.set_subscriptions(specs);
        hook
    }

    /// Replaces the whole list: every current entry is torn down and the
    /// new entries are subscribed.
    pub fn set_subscriptions(&mut self, specs: Vec<SubscriptionSpec>) {
        self.stop_all();
        self.slots = specs
            .into_iter()
            .map(|spec| HookSlot::new(spec.name, spec.config, spec.callback))
            .collect();
        if self.enabled {
            self.start_all();
        }
    }

    /// Enables or disables every entry.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.start_all();
        } else {
            self.stop_all();
        }
    }

    /// Replaces the callback of entry `index` without resubscribing.
    /// Returns `false` if there is no such entry.
    pub fn set_callback(&self, index: usize, callback: Listener) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                slot.set_callback(callback);
                true
            }
            None => false,
        }
    }

    /// Per-entry status, in entry order.
    #[must_use]
    pub fn states(&self) -> Vec<EntryStatus> {
        self.slots
            .iter()
            .map(|slot| {
                let SubscriptionState {
                    is_subscribed,
                    error,
                } = slot.state();
                EntryStatus {
                    name: slot.name().clone(),
                    is_subscribed,
                    error,
                }
            })
            .collect()
    }

    /// `true` if every entry is subscribed.
    #[must_use]
    pub fn all_subscribed(&self) -> bool {
        self.slots.iter().all(|slot| slot.state().is_subscribed)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tears every entry down. Equivalent to dropping the hook.
    pub fn unmount(mut self) {
        self.stop_all();
    }

    fn start_all(&mut self) {
        for slot in &mut self.slots {
            slot.start(&self.pool);
        }
    }

    fn stop_all(&mut self) {
        for slot in &mut self.slots {
            slot.stop();
        }
    }
}

impl Drop for MultiSubscriptionHook {
    fn drop(&mut self) {
        self.stop_all();
    }
}
