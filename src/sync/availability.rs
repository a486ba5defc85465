//! Package availability sync.
//!
//! Any booking change on a package invalidates its availability. The
//! adapter only signals that something changed; slot arithmetic happens
//! server-side, so the computed fields of [`AvailabilityUpdate`] are left
//! at zero and consumers refetch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{DomainAdapter, id_string};
use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, RowChange, RowFilter};
use crate::error::RealtimeError;

/// "Availability changed" notification for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityUpdate {
    /// Package whose bookings changed.
    pub package_id: String,
    /// Booking row that triggered the update, when it carries an id.
    pub booking_id: Option<String>,
    /// Kind of booking change.
    pub change: ChangeEvent,
    /// Always `0`; refetch for the real value.
    pub available_slots: u32,
    /// Always `0`; refetch for the real value.
    pub total_capacity: u32,
    /// Always `0`; refetch for the real value.
    pub booked_slots: u32,
    /// Commit time of the booking change.
    pub changed_at: DateTime<Utc>,
}

/// Follows booking changes of one package.
///
/// [`AvailabilitySync::batched`] produces the per-package entries of a
/// multi-package subscription, which use their own channel names so they
/// never collide with a single-package view of the same package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySync {
    package_id: String,
    batched: bool,
}

impl AvailabilitySync {
    /// Single-package adapter: `availability-<packageId>`.
    #[must_use]
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            batched: false,
        }
    }

    /// Entry of a multi-package subscription:
    /// `availability-multi-<packageId>`.
    #[must_use]
    pub fn batched(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            batched: true,
        }
    }

    /// One batched adapter per package.
    #[must_use]
    pub fn many<I, S>(package_ids: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        package_ids.into_iter().map(Self::batched).collect()
    }
}

impl DomainAdapter for AvailabilitySync {
    type Event = AvailabilityUpdate;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        let prefix = if self.batched {
            "availability-multi"
        } else {
            "availability"
        };
        ChannelName::scoped(prefix, &self.package_id)
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new("bookings", ChangeEvent::All)
            .with_row_filter(RowFilter::eq("package_id", self.package_id.as_str()))
    }

    fn transform(
        &self,
        change: &RowChange<Value>,
    ) -> Result<Option<AvailabilityUpdate>, RealtimeError> {
        Ok(Some(AvailabilityUpdate {
            package_id: self.package_id.clone(),
            booking_id: id_string(change.record().and_then(|row| row.get("id"))),
            change: change.event(),
            available_slots: 0,
            total_capacity: 0,
            booked_slots: 0,
            changed_at: change.commit_timestamp(),
        }))
    }
}
