//! Channel configuration: table, event kind, and row filter.
//!
//! A [`ChannelConfig`] is the predicate handed to the transport when a
//! physical subscription is opened. It is immutable once a channel is
//! created; a different predicate needs a different channel name.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::RowChange;
use crate::error::RealtimeError;

/// Schema used when none is given.
pub const DEFAULT_SCHEMA: &str = "public";

/// Kind of row change a channel listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ChangeEvent {
    /// Row inserted.
    #[serde(rename = "INSERT")]
    Insert,
    /// Row updated.
    #[serde(rename = "UPDATE")]
    Update,
    /// Row deleted.
    #[serde(rename = "DELETE")]
    Delete,
    /// Any of the above.
    #[serde(rename = "*")]
    All,
}

impl ChangeEvent {
    /// Returns `true` if a channel listening for `self` accepts a row
    /// change of kind `other`.
    #[must_use]
    pub fn accepts(self, other: Self) -> bool {
        self == Self::All || self == other
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "*",
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeEvent {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "*" | "ALL" => Ok(Self::All),
            other => Err(RealtimeError::InvalidRequest(format!(
                "unknown change event `{other}`"
            ))),
        }
    }
}

/// Comparison operator of a [`RowFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `eq`
    Eq,
    /// `neq`
    Neq,
    /// `lt`
    Lt,
    /// `lte`
    Lte,
    /// `gt`
    Gt,
    /// `gte`
    Gte,
    /// `in`, value list written as `(a,b,c)`.
    In,
}

impl FilterOperator {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            other => Err(RealtimeError::InvalidFilter(format!(
                "unknown operator `{other}`"
            ))),
        }
    }
}

/// Parsed `column=op.value` row filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowFilter {
    column: String,
    operator: FilterOperator,
    values: Vec<String>,
}

impl RowFilter {
    /// Shorthand for `column=eq.value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: FilterOperator::Eq,
            values: vec![value.into()],
        }
    }

    /// Returns the filtered column.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the comparison operator.
    #[must_use]
    pub const fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// Returns `true` if `row` satisfies the filter. A row without the
    /// column never matches.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let actual = scalar_text(actual);
        match self.operator {
            FilterOperator::Eq => self.values.iter().any(|v| *v == actual),
            FilterOperator::Neq => self.values.iter().all(|v| *v != actual),
            FilterOperator::In => self.values.contains(&actual),
            FilterOperator::Lt => self.compare(&actual).is_some_and(Ordering::is_lt),
            FilterOperator::Lte => self.compare(&actual).is_some_and(Ordering::is_le),
            FilterOperator::Gt => self.compare(&actual).is_some_and(Ordering::is_gt),
            FilterOperator::Gte => self.compare(&actual).is_some_and(Ordering::is_ge),
        }
    }

    fn compare(&self, actual: &str) -> Option<Ordering> {
        let expected = self.values.first()?;
        match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b),
            _ => Some(actual.cmp(expected.as_str())),
        }
    }
}

impl FromStr for RowFilter {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, rest) = s
            .split_once('=')
            .ok_or_else(|| RealtimeError::InvalidFilter(format!("missing `=` in `{s}`")))?;
        let (op, raw) = rest
            .split_once('.')
            .ok_or_else(|| RealtimeError::InvalidFilter(format!("missing operator in `{s}`")))?;
        if column.is_empty() {
            return Err(RealtimeError::InvalidFilter(format!(
                "missing column in `{s}`"
            )));
        }
        let operator: FilterOperator = op.parse()?;
        let values = if operator == FilterOperator::In {
            let inner = raw
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| {
                    RealtimeError::InvalidFilter(format!("`in` expects `(a,b,..)`, got `{raw}`"))
                })?;
            inner
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        } else {
            vec![raw.to_string()]
        };
        Ok(Self {
            column: column.to_string(),
            operator,
            values,
        })
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.", self.column, self.operator.as_str())?;
        if self.operator == FilterOperator::In {
            write!(f, "({})", self.values.join(","))
        } else {
            f.write_str(self.values.first().map_or("", String::as_str))
        }
    }
}

/// Renders a JSON scalar the way it appears in a filter literal.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Predicate of one physical subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelConfig {
    schema: String,
    table: String,
    event: ChangeEvent,
    filter: Option<RowFilter>,
}

impl ChannelConfig {
    /// Creates a config for `table` in the default schema, no filter.
    #[must_use]
    pub fn new(table: impl Into<String>, event: ChangeEvent) -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            event,
            filter: None,
        }
    }

    /// Replaces the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Parses and attaches a `column=op.value` filter.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidFilter`] if the filter is malformed.
    pub fn with_filter(mut self, filter: &str) -> Result<Self, RealtimeError> {
        self.filter = Some(filter.parse()?);
        Ok(self)
    }

    /// Attaches an already-built filter.
    #[must_use]
    pub fn with_row_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
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

    /// Returns the event kind.
    #[must_use]
    pub const fn event(&self) -> ChangeEvent {
        self.event
    }

    /// Returns the row filter, if any.
    #[must_use]
    pub const fn filter(&self) -> Option<&RowFilter> {
        self.filter.as_ref()
    }

    /// Returns `true` if `change` falls under this predicate.
    #[must_use]
    pub fn matches(&self, change: &RowChange<Value>) -> bool {
        if change.schema() != self.schema
            || change.table() != self.table
            || !self.event.accepts(change.event())
        {
            return false;
        }
        match (&self.filter, change.record()) {
            (None, _) => true,
            (Some(filter), Some(row)) => filter.matches(row),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.schema, self.table, self.event)?;
        if let Some(filter) = &self.filter {
            write!(f, "?{filter}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(filter: &str) -> RowFilter {
        let Ok(f) = filter.parse::<RowFilter>() else {
            panic!("valid filter: {filter}");
        };
        f
    }

    #[test]
    fn parses_eq_filter_and_round_trips_display() {
        let f = parse("id=eq.B123");
        assert_eq!(f.column(), "id");
        assert_eq!(f.operator(), FilterOperator::Eq);
        assert_eq!(f.to_string(), "id=eq.B123");
    }

    #[test]
    fn rejects_malformed_filters() {
        assert!("id".parse::<RowFilter>().is_err());
        assert!("id=B123".parse::<RowFilter>().is_err());
        assert!("id=like.B%".parse::<RowFilter>().is_err());
        assert!("=eq.1".parse::<RowFilter>().is_err());
        assert!("id=in.1,2".parse::<RowFilter>().is_err());
    }

    #[test]
    fn eq_matches_strings_and_numbers() {
        assert!(parse("id=eq.B123").matches(&json!({"id": "B123"})));
        assert!(parse("seats=eq.4").matches(&json!({"seats": 4})));
        assert!(!parse("id=eq.B123").matches(&json!({"id": "B124"})));
        assert!(!parse("id=eq.B123").matches(&json!({"other": "B123"})));
    }

    #[test]
    fn in_and_ordering_operators() {
        let f = parse("status=in.(pending,confirmed)");
        assert!(f.matches(&json!({"status": "confirmed"})));
        assert!(!f.matches(&json!({"status": "cancelled"})));
        assert_eq!(f.to_string(), "status=in.(pending,confirmed)");

        assert!(parse("amount=gt.100").matches(&json!({"amount": 250.5})));
        assert!(!parse("amount=gt.100").matches(&json!({"amount": 99})));
        assert!(parse("amount=lte.100").matches(&json!({"amount": 100})));
    }

    #[test]
    fn change_event_accepts() {
        assert!(ChangeEvent::All.accepts(ChangeEvent::Delete));
        assert!(ChangeEvent::Update.accepts(ChangeEvent::Update));
        assert!(!ChangeEvent::Update.accepts(ChangeEvent::Insert));
    }

    #[test]
    fn change_event_wire_format() {
        let json = serde_json::to_string(&ChangeEvent::All).unwrap_or_default();
        assert_eq!(json, "\"*\"");
        assert_eq!("update".parse::<ChangeEvent>().ok(), Some(ChangeEvent::Update));
    }

    #[test]
    fn config_matches_table_event_and_filter() {
        let Ok(cfg) = ChannelConfig::new("bookings", ChangeEvent::Update).with_filter("id=eq.B1")
        else {
            panic!("valid config");
        };
        let hit = RowChange::update("bookings", json!({"id": "B1"}), json!({"id": "B1"}));
        let other_row = RowChange::update("bookings", json!({"id": "B2"}), json!({"id": "B2"}));
        let other_event = RowChange::insert("bookings", json!({"id": "B1"}));
        let other_table = RowChange::update("trips", json!({"id": "B1"}), json!({"id": "B1"}));
        assert!(cfg.matches(&hit));
        assert!(!cfg.matches(&other_row));
        assert!(!cfg.matches(&other_event));
        assert!(!cfg.matches(&other_table));
    }

    #[test]
    fn delete_is_filtered_on_old_row() {
        let Ok(cfg) =
            ChannelConfig::new("trip_guides", ChangeEvent::All).with_filter("trip_id=eq.T1")
        else {
            panic!("valid config");
        };
        let change = RowChange::delete("trip_guides", json!({"id": "a", "trip_id": "T1"}));
        assert!(cfg.matches(&change));
    }

    #[test]
    fn display_includes_filter() {
        let cfg = ChannelConfig::new("bookings", ChangeEvent::All)
            .with_row_filter(RowFilter::eq("package_id", "P9"));
        assert_eq!(cfg.to_string(), "public.bookings:*?package_id=eq.P9");
    }
}
