//! Exponential backoff bookkeeping.

use std::time::Duration;

use ds_core::RetryConfig;

/// Attempt counter and delay schedule for reconnects.
///
/// The delay before reconnect `n` (counting from zero) is
/// `base_interval * 2^n`. After `max_attempts` delays the state is
/// exhausted and [`next_delay`](Self::next_delay) returns `None`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ds_client::RetryState;
///
/// let mut retry = RetryState::new(Duration::from_millis(100), 2);
/// assert_eq!(retry.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(retry.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(retry.next_delay(), None);
///
/// retry.reset();
/// assert_eq!(retry.next_delay(), Some(Duration::from_millis(100)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt_count: u32,
    base_interval: Duration,
    max_attempts: u32,
}

impl RetryState {
    /// Creates a fresh state with no attempts counted.
    #[must_use]
    pub const fn new(base_interval: Duration, max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            base_interval,
            max_attempts,
        }
    }

    /// Creates a fresh state from `config`.
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_interval(), config.max_attempts)
    }

    /// Returns the delay before the next reconnect and counts the attempt,
    /// or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt_count);
        self.attempt_count += 1;
        Some(self.base_interval.saturating_mul(factor))
    }

    /// Forgets past failures. Called when a connection opens.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Delays handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// The retry budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` once no further delay will be handed out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let mut retry = RetryState::from_config(&RetryConfig::default());
        let delays: Vec<u128> = std::iter::from_fn(|| retry.next_delay())
            .map(|d| d.as_millis())
            .collect();

        assert_eq!(delays, [5000, 10000, 20000, 40000, 80000]);
        assert!(retry.is_exhausted());
        assert_eq!(retry.attempt_count(), 5);
        assert_eq!(retry.next_delay(), None);
        assert_eq!(retry.attempt_count(), 5);
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        let mut retry = RetryState::new(Duration::from_secs(1), 0);
        assert!(retry.is_exhausted());
        assert_eq!(retry.next_delay(), None);
    }

    #[test]
    fn test_large_attempts_saturate() {
        let mut retry = RetryState::new(Duration::from_secs(1), 64);
        let last = std::iter::from_fn(|| retry.next_delay()).last();
        assert_eq!(last, Some(Duration::from_secs(1).saturating_mul(u32::MAX)));
    }
}
