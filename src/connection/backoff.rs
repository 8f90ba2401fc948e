//! Reconnect schedule.
//!
//! Attempt `k` (1-based) waits `min(initial * 2^(k-1), max)`. The budget is
//! spent one attempt per failed open or dropped connection and refilled only
//! by a successful open.

use std::time::Duration;

use crate::constants;

/// Static reconnect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt 1.
    pub initial: Duration,
    /// Ceiling for any single delay.
    pub max: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: constants::INITIAL_BACKOFF,
            max: constants::MAX_BACKOFF,
            max_attempts: constants::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for 1-based attempt `attempt`. Attempt 0 is treated as 1.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Mutable attempt counter over a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectBudget {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectBudget {
    /// Full budget for `policy`.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Spend one attempt and return its delay, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for_attempt(self.attempts))
    }

    /// Refill after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts spent since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_from_one_second() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|k| policy.delay_for_attempt(k).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_delay_matches_formula_and_caps() {
        let policy = ReconnectPolicy::default();
        for k in 1..=12u32 {
            let expected = (1000u64 * 2u64.pow(k - 1)).min(30_000);
            assert_eq!(policy.delay_for_attempt(k).as_millis() as u64, expected);
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_exhausts_after_max_attempts() {
        let mut budget = ReconnectBudget::new(ReconnectPolicy::default());
        let mut delays = Vec::new();
        while let Some(delay) = budget.next_delay() {
            delays.push(delay);
        }
        assert_eq!(delays.len(), 5);
        assert_eq!(budget.attempts(), 5);
        assert!(budget.next_delay().is_none());
    }

    #[test]
    fn test_budget_reset_restarts_schedule() {
        let mut budget = ReconnectBudget::new(ReconnectPolicy::default());
        budget.next_delay();
        budget.next_delay();
        budget.reset();
        assert_eq!(budget.next_delay(), Some(Duration::from_secs(1)));
    }
}
