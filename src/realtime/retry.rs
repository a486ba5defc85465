//! Reconnect policy for channels whose transport reports a failure.
//!
//! The default policy never reconnects: a `CHANNEL_ERROR` or `TIMED_OUT`
//! leaves the channel dead until a caller asks the pool for it again.
//! Enabling the policy makes the channel reopen itself with bounded
//! exponential backoff.

use std::time::Duration;

/// Bounded exponential backoff used after `CHANNEL_ERROR` / `TIMED_OUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum reconnect attempts per failure streak. `0` disables retry.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy that never reconnects.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }

    /// Returns `true` if at least one reconnect attempt is allowed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before reconnect `attempt` (1-based), or `None` once the
    /// attempt budget is spent.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        Some(
            self.initial_backoff
                .saturating_mul(factor)
                .min(self.max_backoff),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_retries() {
        let policy = RetryPolicy::disabled();
        assert!(!policy.is_enabled());
        assert_eq!(policy.delay_for(1), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_for(11), None);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(64), Some(Duration::from_secs(5)));
    }
}
