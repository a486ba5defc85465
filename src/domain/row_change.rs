//! Row-change payloads delivered by the transport.
//!
//! A [`RowChange`] carries the `new`/`old` snapshots of one inserted,
//! updated, or deleted row. The constructors enforce the shape for each
//! event kind: INSERT carries only `new`, DELETE only `old`, UPDATE both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChangeEvent;
use super::channel_config::DEFAULT_SCHEMA;
use crate::error::RealtimeError;

/// One row change with its before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange<T> {
    event: ChangeEvent,
    schema: String,
    table: String,
    new: Option<T>,
    old: Option<T>,
    commit_timestamp: DateTime<Utc>,
}

impl<T> RowChange<T> {
    /// Builds an INSERT change.
    #[must_use]
    pub fn insert(table: impl Into<String>, new: T) -> Self {
        Self::build(ChangeEvent::Insert, table.into(), Some(new), None)
    }

    /// Builds an UPDATE change.
    #[must_use]
    pub fn update(table: impl Into<String>, new: T, old: T) -> Self {
        Self::build(ChangeEvent::Update, table.into(), Some(new), Some(old))
    }

    /// Builds a DELETE change.
    #[must_use]
    pub fn delete(table: impl Into<String>, old: T) -> Self {
        Self::build(ChangeEvent::Delete, table.into(), None, Some(old))
    }

    /// Builds a change from loose parts, checking the snapshot shape.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChange`] if `event` is `*` or the
    /// `new`/`old` snapshots do not fit the event kind.
    pub fn try_new(
        event: ChangeEvent,
        table: impl Into<String>,
        new: Option<T>,
        old: Option<T>,
    ) -> Result<Self, RealtimeError> {
        let shape_ok = match event {
            ChangeEvent::Insert => new.is_some() && old.is_none(),
            ChangeEvent::Update => new.is_some() && old.is_some(),
            ChangeEvent::Delete => new.is_none() && old.is_some(),
            ChangeEvent::All => {
                return Err(RealtimeError::InvalidChange(
                    "a row change needs a concrete event, not `*`".to_string(),
                ));
            }
        };
        if !shape_ok {
            return Err(RealtimeError::InvalidChange(format!(
                "{event} expects {}",
                match event {
                    ChangeEvent::Insert => "`new` only",
                    ChangeEvent::Delete => "`old` only",
                    _ => "both `new` and `old`",
                }
            )));
        }
        Ok(Self::build(event, table.into(), new, old))
    }

    fn build(event: ChangeEvent, table: String, new: Option<T>, old: Option<T>) -> Self {
        Self {
            event,
            schema: DEFAULT_SCHEMA.to_string(),
            table,
            new,
            old,
            commit_timestamp: Utc::now(),
        }
    }

    /// Replaces the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn event(&self) -> ChangeEvent {
        self.event
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row after the change (INSERT, UPDATE).
    #[must_use]
    pub const fn new_row(&self) -> Option<&T> {
        self.new.as_ref()
    }

    /// Row before the change (UPDATE, DELETE).
    #[must_use]
    pub const fn old_row(&self) -> Option<&T> {
        self.old.as_ref()
    }

    /// `new`, falling back to `old` for deletes.
    #[must_use]
    pub fn record(&self) -> Option<&T> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// Commit timestamp reported by the source.
    #[must_use]
    pub const fn commit_timestamp(&self) -> DateTime<Utc> {
        self.commit_timestamp
    }
}
