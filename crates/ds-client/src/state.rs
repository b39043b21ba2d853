//! Subscriber lifecycle states.

use std::fmt;

/// Where a subscription is in its connect/retry cycle.
///
/// ```text
/// idle ─▶ connecting ─▶ open ─▶ erroring ─▶ retry_wait ─▶ connecting ─▶ …
///              │                    │
///              └────────────────────┴──▶ exhausted
///
/// any state ─▶ closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    /// Created, not yet connecting.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Receiving frames.
    Open,
    /// The transport failed; deciding whether to retry.
    Erroring,
    /// Waiting out a backoff delay.
    RetryWait,
    /// Closed by the caller.
    Closed,
    /// Gave up after the retry budget was spent.
    Exhausted,
}

impl SubscriberState {
    /// Returns `true` for states that are never left.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Exhausted)
    }

    /// Returns the lowercase state name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Erroring => "erroring",
            Self::RetryWait => "retry_wait",
            Self::Closed => "closed",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SubscriberState::Closed.is_terminal());
        assert!(SubscriberState::Exhausted.is_terminal());
        assert!(!SubscriberState::RetryWait.is_terminal());
        assert_eq!(SubscriberState::RetryWait.to_string(), "retry_wait");
    }
}
