//! Data Transfer Objects for REST request/response serialization.

pub mod change_dto;
pub mod channel_dto;

pub use change_dto::*;
pub use channel_dto::*;
