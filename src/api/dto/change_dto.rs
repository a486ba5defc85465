//! Row-change ingestion DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::{ChangeEvent, RowChange};
use crate::error::RealtimeError;

/// Request body for `POST /changes`, in database-webhook shape.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IngestChangeRequest {
    /// Schema of the changed table. Defaults to the service schema.
    #[serde(default)]
    pub schema: Option<String>,
    /// Changed table.
    pub table: String,
    /// `INSERT`, `UPDATE`, or `DELETE`.
    pub event: ChangeEvent,
    /// Row after the change.
    #[serde(default)]
    pub new: Option<Value>,
    /// Row before the change.
    #[serde(default)]
    pub old: Option<Value>,
}

impl IngestChangeRequest {
    /// Validates the request into a [`RowChange`].
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidRequest`] for an empty table and
    /// [`RealtimeError::InvalidChange`] if `new`/`old` do not fit the
    /// event kind.
    pub fn into_change(self, default_schema: &str) -> Result<RowChange<Value>, RealtimeError> {
        if self.table.trim().is_empty() {
            return Err(RealtimeError::InvalidRequest("table must not be empty".to_string()));
        }
        let schema = self
            .schema
            .unwrap_or_else(|| default_schema.to_string());
        Ok(RowChange::try_new(self.event, self.table, self.new, self.old)?.with_schema(schema))
    }
}

/// Response body for `POST /changes` (202 Accepted).
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestChangeResponse {
    /// Physical subscriptions the change was routed to.
    pub delivered: usize,
    /// Commit timestamp assigned to the change.
    pub commit_timestamp: DateTime<Utc>,
}
