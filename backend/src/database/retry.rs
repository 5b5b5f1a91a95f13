//! Exponential backoff over a fixed attempt budget.
//!
//! The policy holds no counters. Callers pass in how many attempts have
//! failed and how much of their deadline is left, and get back a decision.

use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// Every attempt in the budget has been used.
    Exhausted,
    /// The next delay would run past the caller's deadline.
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt following `attempt` (zero based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Decides whether attempt `attempt` (zero based) may be followed by another one.
    ///
    /// `remaining` is the time left on the caller's deadline, `None` if unbounded.
    pub fn decide(&self, attempt: u32, remaining: Option<Duration>) -> RetryDecision {
        if attempt.saturating_add(1) >= self.max_attempts {
            return RetryDecision::Exhausted;
        }

        let delay = self.delay_for(attempt);
        match remaining {
            Some(left) if left <= delay => RetryDecision::DeadlineExceeded,
            _ => RetryDecision::Retry(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_the_base() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..4).map(|attempt| policy.delay_for(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn last_attempt_is_exhausted() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(3, None), RetryDecision::Retry(Duration::from_secs(8)));
        assert_eq!(policy.decide(4, None), RetryDecision::Exhausted);
    }

    #[test]
    fn deadline_cuts_backoff_short() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(2, Some(Duration::from_secs(3))),
            RetryDecision::DeadlineExceeded
        );
        assert_eq!(
            policy.decide(1, Some(Duration::from_secs(3))),
            RetryDecision::Retry(Duration::from_secs(2))
        );
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.delay_for(64), Duration::from_secs(u32::MAX as u64));
    }
}
