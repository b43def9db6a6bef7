//! Retry policy: a pure function from (attempt, failure class) to a decision.

use std::time::Duration;

use valleyvote_core::RetryConfig;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The remote asked us to slow down.
    RateLimited,
    /// Timeout, connection failure or server error.
    Transient,
    /// Retrying cannot help.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` attempts have been made.
    pub fn decide(&self, attempt: u32, class: FailureClass) -> RetryDecision {
        match class {
            FailureClass::Terminal => RetryDecision::Fail,
            FailureClass::RateLimited | FailureClass::Transient if attempt < self.max_attempts => {
                RetryDecision::RetryAfter(self.backoff(attempt))
            }
            _ => RetryDecision::Fail,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(6), Duration::from_secs(60));
        assert_eq!(p.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn retries_until_max_attempts() {
        let p = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(
            p.decide(1, FailureClass::RateLimited),
            RetryDecision::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(
            p.decide(2, FailureClass::Transient),
            RetryDecision::RetryAfter(Duration::from_millis(20))
        );
        assert_eq!(p.decide(3, FailureClass::Transient), RetryDecision::Fail);
    }

    #[test]
    fn terminal_never_retried() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, FailureClass::Terminal), RetryDecision::Fail);
    }

    #[test]
    fn zero_attempts_means_one() {
        let p = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.decide(1, FailureClass::Transient), RetryDecision::Fail);
    }
}
