//! Booking status sync: `booking-<id>` on `bookings` UPDATE.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DomainAdapter, decode_row};
use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, RowChange, RowFilter};
use crate::error::RealtimeError;

/// A `bookings` row as delivered by the change stream. Columns other than
/// `id` and `status` are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id.
    pub id: String,
    /// Booking status (`pending`, `confirmed`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Remaining columns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Follows status updates of one booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSync {
    booking_id: String,
}

impl BookingSync {
    /// Adapter for `booking_id`.
    #[must_use]
    pub fn new(booking_id: impl Into<String>) -> Self {
        Self {
            booking_id: booking_id.into(),
        }
    }

    /// The followed booking id.
    #[must_use]
    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }
}

impl DomainAdapter for BookingSync {
    type Event = Booking;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        ChannelName::scoped("booking", &self.booking_id)
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new("bookings", ChangeEvent::Update)
            .with_row_filter(RowFilter::eq("id", self.booking_id.as_str()))
    }

    fn transform(&self, change: &RowChange<Value>) -> Result<Option<Booking>, RealtimeError> {
        let Some(row) = change.new_row() else {
            return Ok(None);
        };
        decode_row(&format!("booking-{}", self.booking_id), change, row).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::realtime::SubscriptionPool;
    use crate::realtime::test_support::eventually;
    use crate::sync::{event_callback, subscribe};
    use crate::transport::InMemoryTransport;

    #[test]
    fn channel_and_config() {
        let adapter = BookingSync::new("B123");
        let Ok(name) = adapter.channel_name() else {
            panic!("valid name");
        };
        assert_eq!(name.as_str(), "booking-B123");
        assert_eq!(
            adapter.channel_config().to_string(),
            "public.bookings:UPDATE?id=eq.B123"
        );
    }

    #[test]
    fn transform_passes_new_row_through() {
        let adapter = BookingSync::new("B1");
        let change = RowChange::update(
            "bookings",
            json!({"id": "B1", "status": "confirmed", "guests": 2}),
            json!({"id": "B1", "status": "pending", "guests": 2}),
        );
        let Ok(Some(booking)) = adapter.transform(&change) else {
            panic!("expected booking");
        };
        assert_eq!(booking.status.as_deref(), Some("confirmed"));
        assert_eq!(booking.extra.get("guests"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn end_to_end_booking_update() {
        let transport = InMemoryTransport::new();
        let pool = SubscriptionPool::new(Arc::new(transport.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let Ok(subscription) = subscribe(
            &pool,
            BookingSync::new("B123"),
            event_callback(move |booking: Booking| {
                if let Ok(mut guard) = sink.lock() {
                    guard.push(serde_json::to_value(&booking)?);
                }
                Ok(())
            }),
        ) else {
            panic!("subscribe should succeed");
        };
        assert_eq!(subscription.channel_name().as_str(), "booking-B123");
        assert_eq!(
            subscription.channel().config(),
            &ChannelConfig::new("bookings", ChangeEvent::Update)
                .with_row_filter(RowFilter::eq("id", "B123"))
        );
        assert!(eventually(|| subscription.is_subscribed()).await);

        // Another booking and an insert on the same table are filtered out.
        transport.publish(&RowChange::update(
            "bookings",
            json!({"id": "B999", "status": "confirmed"}),
            json!({"id": "B999", "status": "pending"}),
        ));
        transport.publish(&RowChange::insert(
            "bookings",
            json!({"id": "B123", "status": "pending"}),
        ));
        transport.publish(&RowChange::update(
            "bookings",
            json!({"id": "B123", "status": "confirmed"}),
            json!({"id": "B123", "status": "pending"}),
        ));

        assert!(eventually(|| seen.lock().is_ok_and(|g| !g.is_empty())).await);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let Ok(guard) = seen.lock() else {
            panic!("lock poisoned");
        };
        assert_eq!(*guard, vec![json!({"id": "B123", "status": "confirmed"})]);
        drop(guard);
        subscription.unsubscribe();
        assert!(pool.is_empty());
    }
}
