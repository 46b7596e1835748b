//! Retry schedules consulted when a channel drops into `Error`.

use std::time::Duration;

/// Decides whether and when a failed channel is reconnected.
///
/// `attempt` counts from 1 for the first retry after a failure and resets
/// once the channel opens again.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before retry number `attempt`, or `None` to give up.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Same delay before every retry.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        within(attempt, self.max_attempts).then_some(self.delay)
    }
}

/// Doubles the delay per attempt up to `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !within(attempt, self.max_attempts) {
            return None;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: Some(10),
        }
    }
}

fn within(attempt: u32, max_attempts: Option<u32>) -> bool {
    attempt >= 1 && max_attempts.is_none_or(|max| attempt <= max)
}
