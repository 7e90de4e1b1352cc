//! Retry logic with exponential backoff.

use rand::Rng;
use std::time::Duration;

/// What to do with a task whose attempt just failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue once `delay` has passed
    Retry { delay: Duration },
    /// No attempts left; the task fails
    Exhausted,
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Add up to half the computed delay at random
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic backoff after `attempts` consumed tries:
    /// `base_delay * 2^(attempts - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus jitter (when enabled).
    ///
    /// Jitter stays below half the base backoff, so delays still grow
    /// strictly with the attempt number until the cap.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let delay = self.backoff(attempts);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 2;
        if spread == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..spread);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// A task may retry while it has used no more than `max_retries` attempts,
    /// so the `max_retries + 1`-th failure is final.
    pub fn should_retry(&self, attempts: u32, max_retries: u32) -> bool {
        attempts <= max_retries
    }

    pub fn decide(&self, attempts: u32, max_retries: u32) -> RetryDecision {
        if self.should_retry(attempts, max_retries) {
            RetryDecision::Retry {
                delay: self.delay_for(attempts),
            }
        } else {
            RetryDecision::Exhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(3600));
        assert!(!policy.jitter);
    }

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy::default();

        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();

        // 1, 2, 4, 8, 16
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_delay_strictly_increases_below_cap() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(3600));

        for n in 1..15 {
            assert!(policy.delay_for(n + 1) > policy.delay_for(n), "attempt {}", n);
        }
    }

    #[test]
    fn test_jitter_keeps_ordering() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(3600))
            .with_jitter(true);

        for n in 1..10 {
            let delay = policy.delay_for(n);
            let base = policy.backoff(n);
            assert!(delay >= base && delay < base + base / 2);
            assert!(policy.delay_for(n + 1) > delay);
        }
    }

    #[test]
    fn test_calculate_delay_cap_at_max() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(3600));
        // 5 * 2^10 = 5120 seconds, capped at one hour
        assert_eq!(policy.delay_for(11), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();

        // max_retries = 3 allows four attempts in total
        assert!(policy.should_retry(1, 3));
        assert!(policy.should_retry(3, 3));
        assert!(!policy.should_retry(4, 3));

        // Zero retries: the first failure is final
        assert!(!policy.should_retry(1, 0));
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(1));

        assert_eq!(
            policy.decide(2, 3),
            RetryDecision::Retry {
                delay: Duration::from_millis(20)
            }
        );
        assert_eq!(policy.decide(4, 3), RetryDecision::Exhausted);
    }
}
