//! Retry policy for search attempts.
//!
//! Implements exponential backoff between attempts.

use crate::config::SearchSettings;
use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after each failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay,
            ..Default::default()
        }
    }

    /// Wait after the failed attempt with zero-based index `attempt`:
    /// `initial_delay * multiplier^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }

    /// Whether another attempt follows the one with zero-based index `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_settings() {
        let settings = SearchSettings {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            ..Default::default()
        };
        let policy = RetryPolicy::new(&settings);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn test_no_wait_after_final_attempt() {
        let policy = RetryPolicy::default();

        assert!(policy.has_next(0));
        assert!(policy.has_next(1));
        assert!(!policy.has_next(2));
    }
}
