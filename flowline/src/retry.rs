//! Retry policy with exponential backoff and optional jitter.
//!
//! The policy is a pure computation: given an attempt number it yields a
//! bounded delay, and given an attempt count plus a retryability flag it
//! decides whether another attempt is allowed. No I/O, no shared state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for per-step retry behavior.
///
/// The delay for attempt `n` (1-indexed) is
/// `min(base_delay * multiplier^(n-1), max_delay)`, optionally perturbed by
/// full jitter drawn uniformly from `[0, delay]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one. Always at least 1.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt. Always at least 1.0.
    pub multiplier: f64,
    /// Whether to apply full jitter to the computed delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay.is_zero() {
            return Err("base_delay must be greater than zero".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("max_delay must be at least base_delay".to_string());
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }

    /// Decides whether a failed attempt may be retried.
    ///
    /// `attempt` is the number of attempts already made (1-indexed).
    #[must_use]
    pub fn should_retry(&self, attempt: u32, retryable: bool) -> bool {
        retryable && attempt < self.max_attempts
    }

    /// Computes the backoff delay before retrying after `attempt` (1-indexed).
    ///
    /// Uses the thread-local RNG for jitter. Tests that need deterministic
    /// delays should use [`RetryPolicy::delay_for_with_rng`] with a seeded
    /// RNG.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_for_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Computes the backoff delay using the supplied RNG for jitter.
    #[must_use]
    pub fn delay_for_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter && capped > 0.0 {
            rng.gen_range(0.0..=capped)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RetryPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_builder_setters() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_base_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(5))
            .with_multiplier(3.0)
            .with_jitter(false);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert!((policy.multiplier - 3.0).abs() < f64::EPSILON);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert!(RetryPolicy::new().with_max_attempts(0).validate().is_err());
        assert!(RetryPolicy::new()
            .with_base_delay(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RetryPolicy::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(RetryPolicy::new().with_multiplier(0.5).validate().is_err());
    }

    #[test]
    fn test_delay_exponential_without_jitter() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_monotone_and_capped() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(false);

        let mut previous = Duration::ZERO;
        for attempt in 1..=20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "delay decreased at attempt {attempt}");
            assert!(delay <= Duration::from_secs(1));
            previous = delay;
        }
        assert_eq!(policy.delay_for(20), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(true);

        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_jitter_deterministic_with_seed() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(500))
            .with_jitter(true);

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);

        for attempt in 1..=5 {
            assert_eq!(
                policy.delay_for_with_rng(attempt, &mut rng_a),
                policy.delay_for_with_rng(attempt, &mut rng_b)
            );
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new().with_max_attempts(3);

        assert!(policy.should_retry(1, true));
        assert!(policy.should_retry(2, true));
        assert!(!policy.should_retry(3, true));
        assert!(!policy.should_retry(1, false));
    }

    #[test]
    fn test_no_retries_policy() {
        let policy = RetryPolicy::no_retries();
        assert!(!policy.should_retry(1, true));
        assert!(policy.validate().is_ok());
    }
}
