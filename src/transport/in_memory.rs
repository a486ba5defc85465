//! In-process transport.
//!
//! [`InMemoryTransport`] keeps a registry of open subscriptions and routes
//! every published [`RowChange`] to the ones whose predicate matches. The
//! relay feeds it from the ingest endpoint; tests drive it directly and
//! use its counters to observe how many physical subscriptions were
//! opened and closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

use super::{OpenedChannel, Transport, TransportHandle, TransportMessage};
use crate::domain::{ChannelConfig, ChannelName, RowChange, TransportStatus};
use crate::error::RealtimeError;

#[derive(Debug)]
struct Subscriber {
    name: ChannelName,
    config: ChannelConfig,
    tx: mpsc::UnboundedSender<TransportMessage>,
}

#[derive(Debug)]
struct Inner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    auto_confirm: bool,
    opened: AtomicU64,
    closed: AtomicU64,
    refuse_next: Mutex<Option<String>>,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Row-change router living in the same process as its subscribers.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl InMemoryTransport {
    /// Creates a transport that confirms every subscription immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Creates a transport that leaves subscriptions unconfirmed until
    /// [`Self::emit_status`] is called.
    #[must_use]
    pub fn manual() -> Self {
        Self::build(false)
    }

    fn build(auto_confirm: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                auto_confirm,
                opened: AtomicU64::new(0),
                closed: AtomicU64::new(0),
                refuse_next: Mutex::new(None),
            }),
        }
    }

    /// Routes a change to every open subscription whose predicate matches.
    ///
    /// Returns the number of subscriptions the change was queued for.
    pub fn publish(&self, change: &RowChange<Value>) -> usize {
        let mut subscribers = self.inner.subscribers();
        let mut delivered = 0;
        subscribers.retain(|_, sub| {
            if !sub.config.matches(change) {
                return true;
            }
            if sub.tx.send(TransportMessage::Change(change.clone())).is_ok() {
                delivered += 1;
                true
            } else {
                false
            }
        });
        tracing::debug!(
            table = change.table(),
            event = %change.event(),
            delivered,
            "row change published"
        );
        delivered
    }

    /// Pushes a status transition to every open subscription named `name`.
    ///
    /// Returns the number of subscriptions notified.
    pub fn emit_status(&self, name: &ChannelName, status: &TransportStatus) -> usize {
        let subscribers = self.inner.subscribers();
        subscribers
            .values()
            .filter(|sub| sub.name == *name)
            .filter(|sub| sub.tx.send(TransportMessage::Status(status.clone())).is_ok())
            .count()
    }

    /// Makes the next [`Transport::open`] call fail with `reason`.
    pub fn refuse_next_open(&self, reason: impl Into<String>) {
        *self
            .inner
            .refuse_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Number of physical subscriptions opened so far.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Number of physical subscriptions closed so far.
    #[must_use]
    pub fn close_count(&self) -> u64 {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of physical subscriptions currently open.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryTransport {
    fn open(
        &self,
        name: &ChannelName,
        config: &ChannelConfig,
    ) -> Result<OpenedChannel, RealtimeError> {
        if let Some(reason) = self
            .inner
            .refuse_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(RealtimeError::TransportUnavailable(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if self.inner.auto_confirm {
            // Receiver is alive in this scope, send cannot fail.
            let _ = tx.send(TransportMessage::Status(TransportStatus::Subscribed));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers().insert(
            id,
            Subscriber {
                name: name.clone(),
                config: config.clone(),
                tx,
            },
        );
        self.inner.opened.fetch_add(1, Ordering::SeqCst);

        Ok(OpenedChannel {
            messages: rx,
            handle: Box::new(InMemoryHandle {
                id,
                inner: Arc::clone(&self.inner),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

#[derive(Debug)]
struct InMemoryHandle {
    id: u64,
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl TransportHandle for InMemoryHandle {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.subscribers().remove(&self.id);
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}
