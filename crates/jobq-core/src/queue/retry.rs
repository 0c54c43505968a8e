//! Backoff policy: decides retry delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::millis;

/// Retry delay policy for failed jobs.
///
/// The queue holds a default policy and a job may carry its own override
/// (`JobOptions::backoff`). Either way the delay is a pure function of the
/// attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// `base * 2^(attempts - 1)`
    Exponential {
        #[serde(rename = "base_ms", with = "millis")]
        base: Duration,
    },

    /// The same delay for every retry.
    Fixed {
        #[serde(rename = "delay_ms", with = "millis")]
        delay: Duration,
    },
}

impl BackoffPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_millis(1000);

    pub fn exponential(base: Duration) -> Self {
        BackoffPolicy::Exponential { base }
    }

    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed { delay }
    }

    /// Delay before the next retry.
    ///
    /// # Arguments
    /// * `attempts` - Number of attempts already made (1-indexed).
    ///
    /// Example with the default base of 1s:
    /// - attempt 1 (first failure): 1s
    /// - attempt 2: 2s
    /// - attempt 3: 4s
    ///
    /// `attempts = 0` is treated like 1. The result saturates at
    /// `Duration::MAX` instead of overflowing.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match *self {
            BackoffPolicy::Exponential { base } => {
                if base.is_zero() {
                    return Duration::ZERO;
                }
                match 2u32.checked_pow(attempts.saturating_sub(1)) {
                    Some(factor) => base.saturating_mul(factor),
                    None => Duration::MAX,
                }
            }
            BackoffPolicy::Fixed { delay } => delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::exponential(Self::DEFAULT_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_is_exponential_one_second() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy, BackoffPolicy::exponential(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[case(10)]
    fn exponential_doubles_each_attempt(#[case] n: u32) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(n + 1), policy.delay_for(n) * 2);
    }

    #[test]
    fn zero_attempts_uses_base() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(100)]
    fn fixed_ignores_attempts(#[case] attempts: u32) {
        let policy = BackoffPolicy::fixed(Duration::from_millis(300));
        assert_eq!(policy.delay_for(attempts), Duration::from_millis(300));
    }

    #[test]
    fn serializes_with_millisecond_fields() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(1500));
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "fixed", "delay_ms": 1500 }));

        let back: BackoffPolicy =
            serde_json::from_value(serde_json::json!({ "type": "exponential", "base_ms": 200 }))
                .unwrap();
        assert_eq!(back, BackoffPolicy::exponential(Duration::from_millis(200)));
    }
}
