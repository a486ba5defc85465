//! Trip status and trip-guide assignment sync.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DomainAdapter, decode_row};
use crate::domain::{ChangeEvent, ChannelConfig, ChannelName, RowChange, RowFilter};
use crate::error::RealtimeError;

/// A `trips` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip id.
    pub id: String,
    /// Trip status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Remaining columns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Follows status updates of one trip: `trip-<id>` on `trips` UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripStatusSync {
    trip_id: String,
}

impl TripStatusSync {
    /// Adapter for `trip_id`.
    #[must_use]
    pub fn new(trip_id: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
        }
    }
}

impl DomainAdapter for TripStatusSync {
    type Event = Trip;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        ChannelName::scoped("trip", &self.trip_id)
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new("trips", ChangeEvent::Update)
            .with_row_filter(RowFilter::eq("id", self.trip_id.as_str()))
    }

    fn transform(&self, change: &RowChange<Value>) -> Result<Option<Trip>, RealtimeError> {
        let Some(row) = change.new_row() else {
            return Ok(None);
        };
        decode_row(&format!("trip-{}", self.trip_id), change, row).map(Some)
    }
}

/// A `trip_guides` row. Every column is optional since deletes may carry
/// only the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripAssignment {
    /// Assignment row id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Assigned trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    /// Assigned guide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_id: Option<String>,
    /// Remaining columns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An assignment row plus the kind of change that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripAssignmentChange {
    /// INSERT, UPDATE, or DELETE.
    pub event: ChangeEvent,
    /// Row after the change, or before it for deletes.
    pub assignment: TripAssignment,
}

/// Follows guide assignments of one trip:
/// `trip-assignment-<tripId>` on `trip_guides`, every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripAssignmentSync {
    trip_id: String,
}

impl TripAssignmentSync {
    /// Adapter for `trip_id`.
    #[must_use]
    pub fn new(trip_id: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
        }
    }
}

impl DomainAdapter for TripAssignmentSync {
    type Event = TripAssignmentChange;

    fn channel_name(&self) -> Result<ChannelName, RealtimeError> {
        ChannelName::scoped("trip-assignment", &self.trip_id)
    }

    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new("trip_guides", ChangeEvent::All)
            .with_row_filter(RowFilter::eq("trip_id", self.trip_id.as_str()))
    }

    fn transform(
        &self,
        change: &RowChange<Value>,
    ) -> Result<Option<TripAssignmentChange>, RealtimeError> {
        let Some(row) = change.record() else {
            return Ok(None);
        };
        let assignment = decode_row(&format!("trip-assignment-{}", self.trip_id), change, row)?;
        Ok(Some(TripAssignmentChange {
            event: change.event(),
            assignment,
        }))
    }
}
