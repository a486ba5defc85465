//! Subscription layer: the pool, the channel wrapper, and the lifecycle
//! hooks built on them.
//!
//! ```text
//! SubscriptionHook / MultiSubscriptionHook
//!     │  mount / update / drop
//!     ▼
//! SubscriptionPool ── one RealtimeChannel per ChannelName
//!     │  get_or_create / release
//!     ▼
//! Transport::open ── TransportMessage stream ── dispatcher task
//! ```

pub mod channel;
pub mod hook;
pub mod multi_hook;
pub mod pool;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{Listener, ListenerFn, ListenerId, RealtimeChannel, listener};
pub use hook::{CallbackSlot, SubscriptionHook, SubscriptionState};
pub use multi_hook::{EntryStatus, MultiSubscriptionHook, SubscriptionSpec};
pub use pool::{ChannelSummary, Subscription, SubscriptionPool};
pub use retry::RetryPolicy;
