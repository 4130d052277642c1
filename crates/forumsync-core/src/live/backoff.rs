//! Reconnect backoff policy

use std::time::Duration;

/// Exponential reconnect backoff
///
/// `delay(n) = min(max_delay, base_delay * 2^(n-1))` for attempt `n >= 1`.
/// The attempt counter saturates at `attempt_cap`; retries themselves never
/// stop, they just keep waiting the capped delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    attempt_cap: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 10)
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, attempt_cap: u32) -> Self {
        Self {
            attempt: 0,
            base_delay,
            max_delay,
            attempt_cap: attempt_cap.max(1),
        }
    }

    /// Current attempt number (0 when connected or never failed)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for a given attempt number
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.min(self.attempt_cap) - 1;
        // shifts past 31 bits saturate
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Advance to the next attempt and return `(attempt, delay)`
    pub fn next_attempt(&mut self) -> (u32, Duration) {
        self.attempt = (self.attempt + 1).min(self.attempt_cap);
        (self.attempt, self.delay_for(self.attempt))
    }

    /// Reset after a successful open
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
