//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LISTEN_ADDR` | `0.0.0.0:3000` |
//! | `REALTIME_SCHEMA` | `public` |
//! | `REALTIME_RETRY_MAX_ATTEMPTS` | `0` (no reconnect) |
//! | `REALTIME_RETRY_INITIAL_BACKOFF_MS` | `500` |
//! | `REALTIME_RETRY_MAX_BACKOFF_MS` | `30000` |
//! | `WS_OUTBOUND_CAPACITY` | `1024` |
//! | `LOG_FORMAT` | `pretty` |

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::channel_config::DEFAULT_SCHEMA;
use crate::realtime::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Schema used by adapters and ingested changes when none is given.
    pub schema: String,

    /// Reconnect policy for channels that fail after opening.
    pub retry: RetryPolicy,

    /// Events buffered per WebSocket connection before new ones are
    /// dropped.
    pub ws_outbound_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl RealtimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()?;

        let schema = lookup("REALTIME_SCHEMA")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

        let defaults = RetryPolicy::disabled();
        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "REALTIME_RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            initial_backoff: Duration::from_millis(parse_var(
                &lookup,
                "REALTIME_RETRY_INITIAL_BACKOFF_MS",
                500,
            )),
            max_backoff: Duration::from_millis(parse_var(
                &lookup,
                "REALTIME_RETRY_MAX_BACKOFF_MS",
                30_000,
            )),
        };

        let ws_outbound_capacity = parse_var(&lookup, "WS_OUTBOUND_CAPACITY", 1024_usize).max(1);

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json" | "JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            schema,
            retry,
            ws_outbound_capacity,
            log_format,
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RealtimeConfig, Box<dyn std::error::Error>> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RealtimeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let Ok(config) = load(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.schema, "public");
        assert!(!config.retry.is_enabled());
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.ws_outbound_capacity, 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_and_fallbacks() {
        let Ok(config) = load(&[
            ("LISTEN_ADDR", "127.0.0.1:8080"),
            ("REALTIME_SCHEMA", "travel"),
            ("REALTIME_RETRY_MAX_ATTEMPTS", "5"),
            ("REALTIME_RETRY_MAX_BACKOFF_MS", "not-a-number"),
            ("WS_OUTBOUND_CAPACITY", "0"),
            ("LOG_FORMAT", "json"),
        ]) else {
            panic!("overrides should load");
        };
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.schema, "travel");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_backoff, Duration::from_secs(30));
        assert_eq!(config.ws_outbound_capacity, 1);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_listen_addr_is_an_error() {
        assert!(load(&[("LISTEN_ADDR", "nowhere")]).is_err());
    }
}
