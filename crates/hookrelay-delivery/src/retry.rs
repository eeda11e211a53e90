//! Backoff computation for the retry scheduler.
//!
//! Exponential delays follow min(max_delay, base_delay × 2^(n-1)) for the
//! n-th failed attempt, optionally multiplied by a uniform jitter factor in
//! [1 - jitter, 1 + jitter]. A subscriber's Retry-After acts as a floor on
//! the computed delay, never below it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hookrelay_core::models::{BackoffKind, RetryPolicy};
use rand::Rng;

/// Outcome of consulting the policy after a retryable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt no earlier than `next_attempt_at`.
    Retry {
        delay: Duration,
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt ceiling is reached; the delivery is exhausted.
    GiveUp,
}

// Exponent clamp keeps the shift well inside u32 range even for absurd
// attempt counts.
const MAX_EXPONENT: u32 = 20;

/// Raw backoff delay for the given 1-based failed-attempt ordinal, before
/// jitter.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let delay = match policy.backoff {
        BackoffKind::Fixed => policy.base_delay,
        BackoffKind::Exponential => {
            let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
            policy.base_delay.saturating_mul(1u32 << exponent)
        },
    };
    delay.min(policy.max_delay)
}

/// Multiplies a delay by a uniform factor in [1 - jitter, 1 + jitter].
pub fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let jitter = jitter.min(1.0);
    let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
    delay.mul_f64(factor)
}

/// Decides whether a delivery gets another attempt.
///
/// `attempt_count` is the number of attempts already performed;
/// `max_attempts` is the ceiling captured on the delivery at creation.
pub fn decide(
    policy: &RetryPolicy,
    attempt_count: u32,
    max_attempts: u32,
    retry_after: Option<Duration>,
    now: DateTime<Utc>,
) -> RetryDecision {
    if attempt_count >= max_attempts {
        return RetryDecision::GiveUp;
    }

    let mut delay = apply_jitter(backoff_delay(policy, attempt_count), policy.jitter);
    if let Some(floor) = retry_after {
        delay = delay.max(floor);
    }

    let next_attempt_at =
        now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
    RetryDecision::Retry { delay, next_attempt_at }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }

    #[test]
    fn exponential_progression_doubles_until_cap() {
        let policy = exponential_policy();
        let expected = [1, 2, 4, 8, 16, 32, 60, 60, 60];

        for (i, secs) in expected.iter().enumerate() {
            let attempt = u32::try_from(i).unwrap() + 1;
            assert_eq!(
                backoff_delay(&policy, attempt),
                Duration::from_secs(*secs),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn delays_never_decrease() {
        let policy = exponential_policy();
        let mut previous = Duration::ZERO;
        for attempt in 1..=30 {
            let delay = backoff_delay(&policy, attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy {
            backoff: BackoffKind::Fixed,
            base_delay: Duration::from_secs(5),
            ..exponential_policy()
        };
        for attempt in 1..=8 {
            assert_eq!(backoff_delay(&policy, attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = exponential_policy();
        assert_eq!(backoff_delay(&policy, u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_band() {
        let delay = Duration::from_secs(10);
        for _ in 0..200 {
            let jittered = apply_jitter(delay, 0.25);
            assert!(jittered >= Duration::from_millis(7500), "{jittered:?}");
            assert!(jittered <= Duration::from_millis(12500), "{jittered:?}");
        }
    }

    #[test]
    fn zero_jitter_leaves_delay_untouched() {
        let delay = Duration::from_secs(3);
        assert_eq!(apply_jitter(delay, 0.0), delay);
    }

    #[test]
    fn gives_up_at_attempt_ceiling() {
        let policy = exponential_policy();
        let now = Utc::now();

        assert!(matches!(
            decide(&policy, 2, 3, None, now),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(decide(&policy, 3, 3, None, now), RetryDecision::GiveUp);
        assert_eq!(decide(&policy, 4, 3, None, now), RetryDecision::GiveUp);
    }

    #[test]
    fn retry_after_floors_the_delay() {
        let policy = exponential_policy();
        let now = Utc::now();

        let decision = decide(&policy, 1, 5, Some(Duration::from_secs(30)), now);
        match decision {
            RetryDecision::Retry { delay, next_attempt_at } => {
                assert_eq!(delay, Duration::from_secs(30));
                assert_eq!(next_attempt_at, now + chrono::Duration::seconds(30));
            },
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }

    #[test]
    fn short_retry_after_does_not_shrink_backoff() {
        let policy = exponential_policy();
        let decision = decide(&policy, 4, 10, Some(Duration::from_secs(1)), Utc::now());
        match decision {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(8)),
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }
}
