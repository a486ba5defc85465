//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` lets clients follow domain adapters.
//! Clients following the same channel share one physical subscription;
//! each connection holds its own listener on it.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
