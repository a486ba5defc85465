//! Shared helpers for the realtime unit tests.
#![allow(clippy::panic)]

use std::time::Duration;

use crate::domain::{ChangeEvent, ChannelConfig, ChannelName};

pub(crate) fn channel_name(name: &str) -> ChannelName {
    let Ok(name) = ChannelName::new(name) else {
        panic!("valid channel name: {name}");
    };
    name
}

pub(crate) fn booking_config(id: &str) -> ChannelConfig {
    let Ok(config) =
        ChannelConfig::new("bookings", ChangeEvent::Update).with_filter(&format!("id=eq.{id}"))
    else {
        panic!("valid config");
    };
    config
}

/// Polls `check` until it holds or roughly one second passes.
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
