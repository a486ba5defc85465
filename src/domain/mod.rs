//! Domain layer: channel identity, channel predicates, row changes, and
//! connection state.
//!
//! These types are shared by the transport, the subscription pool, and
//! the domain sync adapters.

pub mod channel_config;
pub mod channel_name;
pub mod channel_state;
pub mod row_change;

pub use channel_config::{ChangeEvent, ChannelConfig, FilterOperator, RowFilter};
pub use channel_name::ChannelName;
pub use channel_state::{ChannelState, TransportStatus};
pub use row_change::RowChange;
