//! Per-connection subscription manager.
//!
//! Holds the [`Subscription`]s a WebSocket client created, keyed by
//! channel name. Dropping the manager releases all of them, so a closed
//! connection never leaves listeners behind on shared channels.

use std::collections::HashMap;

use crate::domain::ChannelName;
use crate::realtime::Subscription;

/// Manages the subscriptions of a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<ChannelName, Subscription>,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `subscription`. If the connection already follows that
    /// channel through a live handle, the new handle is released and
    /// `false` is returned. A handle whose channel was closed underneath
    /// it is replaced.
    pub fn add(&mut self, subscription: Subscription) -> bool {
        if let Some(existing) = self.subscriptions.get(subscription.channel_name())
            && !existing.is_released()
            && !existing.channel().is_closed()
        {
            subscription.unsubscribe();
            return false;
        }
        let name = subscription.channel_name().clone();
        if let Some(stale) = self.subscriptions.insert(name, subscription) {
            tracing::debug!(channel = %stale.channel_name(), "replaced closed subscription");
        }
        true
    }

    /// Releases the subscription for `name`. Returns `false` if the
    /// connection did not follow it.
    pub fn remove(&mut self, name: &ChannelName) -> bool {
        match self.subscriptions.remove(name) {
            Some(subscription) => {
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the connection follows `name`.
    #[must_use]
    pub fn contains(&self, name: &ChannelName) -> bool {
        self.subscriptions.contains_key(name)
    }

    /// Followed channel names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.keys().map(ToString::to_string).collect();
        names.sort();
        names
    }

    /// Returns the number of followed channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Releases every subscription.
    pub fn clear(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::realtime::test_support::{booking_config, channel_name};
    use crate::realtime::{SubscriptionPool, listener};
    use crate::transport::InMemoryTransport;

    fn subscribe(pool: &SubscriptionPool, id: &str) -> Subscription {
        let Ok(sub) = pool.get_or_create(
            channel_name(&format!("booking-{id}")),
            booking_config(id),
            listener(|_| Ok(())),
        ) else {
            panic!("subscribe should succeed");
        };
        sub
    }

    #[tokio::test]
    async fn duplicate_add_is_released() {
        let transport = InMemoryTransport::new();
        let pool = SubscriptionPool::new(Arc::new(transport.clone()));
        let mut mgr = SubscriptionManager::new();

        assert!(mgr.add(subscribe(&pool, "B1")));
        assert!(!mgr.add(subscribe(&pool, "B1")));
        assert_eq!(mgr.count(), 1);
        let Some(channel) = pool.get(&channel_name("booking-B1")) else {
            panic!("channel should exist");
        };
        assert_eq!(channel.listener_count(), 1);
    }

    #[tokio::test]
    async fn closed_channel_is_replaced_on_add() {
        let transport = InMemoryTransport::new();
        let pool = SubscriptionPool::new(Arc::new(transport.clone()));
        let mut mgr = SubscriptionManager::new();

        assert!(mgr.add(subscribe(&pool, "B1")));
        assert!(pool.close_channel(&channel_name("booking-B1")).is_ok());

        assert!(mgr.add(subscribe(&pool, "B1")));
        assert_eq!(mgr.count(), 1);
        let Some(channel) = pool.get(&channel_name("booking-B1")) else {
            panic!("fresh channel should be pooled");
        };
        assert!(!channel.is_closed());
        assert_eq!(channel.listener_count(), 1);
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn remove_and_drop_release() {
        let transport = InMemoryTransport::new();
        let pool = SubscriptionPool::new(Arc::new(transport.clone()));
        let mut mgr = SubscriptionManager::new();
        mgr.add(subscribe(&pool, "B1"));
        mgr.add(subscribe(&pool, "B2"));
        assert_eq!(mgr.names(), vec!["booking-B1", "booking-B2"]);

        assert!(mgr.remove(&channel_name("booking-B1")));
        assert!(!mgr.remove(&channel_name("booking-B1")));
        assert!(!pool.contains(&channel_name("booking-B1")));

        drop(mgr);
        assert!(pool.is_empty());
        assert_eq!(transport.close_count(), 2);
    }
}
