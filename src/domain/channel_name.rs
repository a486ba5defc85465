//! Type-safe channel identifier.
//!
//! [`ChannelName`] is a newtype around the string that identifies one
//! logical subscription (e.g. `"booking-B123"`). Using a dedicated type
//! keeps channel names from being confused with table names or filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Unique name of one logical (table, event, filter) subscription.
///
/// Used as the key of [`crate::realtime::SubscriptionPool`]. At most one
/// physical subscription exists per name at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Creates a channel name after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] if the name is empty
    /// or contains whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, RealtimeError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RealtimeError::InvalidChannelName(name));
        }
        Ok(Self(name))
    }

    /// Builds `<prefix>-<id>` names used by the domain adapters.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidChannelName`] if `id` is empty or
    /// contains whitespace.
    pub fn scoped(prefix: &str, id: &str) -> Result<Self, RealtimeError> {
        if id.is_empty() {
            return Err(RealtimeError::InvalidChannelName(format!("{prefix}-")));
        }
        Self::new(format!("{prefix}-{id}"))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelName {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = RealtimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
