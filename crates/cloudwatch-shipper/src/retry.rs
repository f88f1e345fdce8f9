//! Failure classification and backoff policy for remote delivery.
//!
//! Remote failures fall into three kinds: throttling (retry with a long
//! backoff cap), transient connectivity problems (retry with a short cap),
//! and permanent failures (no retry, surfaced to the operator). Delays
//! double per attempt up to the kind's cap, with proportional random jitter
//! to avoid synchronized retries across streams.

use std::time::Duration;

use rand::Rng;

use crate::transport::TransportError;

/// Retry class of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Remote rate limit; retry with the long backoff cap.
    Throttled,
    /// Network or timeout failure; retry with the short backoff cap.
    Transient,
    /// Authorization failure, malformed request, or deleted resource;
    /// never retried.
    Permanent,
}

impl FailureKind {
    /// Classifies a transport error.
    ///
    /// Sequence conflicts and missing streams are handled by the stream
    /// writer's one-shot recoveries before the controller sees them; when
    /// they do arrive here (recovery already spent), they are permanent for
    /// this flush.
    #[must_use]
    pub fn of(err: &TransportError) -> FailureKind {
        match err {
            TransportError::Throttled(_) => FailureKind::Throttled,
            TransportError::Connectivity(_) | TransportError::Service(_) => FailureKind::Transient,
            TransportError::Auth(_)
            | TransportError::Malformed(_)
            | TransportError::SequenceConflict { .. }
            | TransportError::ResourceMissing(_) => FailureKind::Permanent,
        }
    }
}

/// Backoff configuration for retryable failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts per batch before delivery fails.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Delay ceiling for throttled failures.
    pub throttle_cap: Duration,
    /// Delay ceiling for transient failures.
    pub transient_cap: Duration,
    /// Jitter fraction (0.0–1.0) added on top of the capped delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            throttle_cap: Duration::from_secs(30),
            transient_cap: Duration::from_secs(5),
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (1-based).
    ///
    /// Exponential doubling from [`base_delay`](Self::base_delay), capped per
    /// failure kind, plus up to `jitter_factor` of the capped delay.
    #[must_use]
    pub fn delay_for(&self, kind: FailureKind, attempt: u32) -> Duration {
        let cap = match kind {
            FailureKind::Throttled => self.throttle_cap,
            FailureKind::Transient => self.transient_cap,
            FailureKind::Permanent => return Duration::ZERO,
        };

        // Shift saturates well past any realistic cap.
        let multiplier = 1u32 << attempt.saturating_sub(1).min(20);
        let capped = (self.base_delay * multiplier).min(cap);

        if self.jitter_factor > 0.0 {
            let jitter = rand::rng().random_range(0.0..self.jitter_factor);
            capped + Duration::from_secs_f64(capped.as_secs_f64() * jitter)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_classify_throttled() {
        let err = TransportError::Throttled("rate exceeded".into());
        assert_eq!(FailureKind::of(&err), FailureKind::Throttled);
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            FailureKind::of(&TransportError::Connectivity("timeout".into())),
            FailureKind::Transient
        );
        assert_eq!(
            FailureKind::of(&TransportError::Service("unavailable".into())),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_classify_permanent() {
        assert_eq!(
            FailureKind::of(&TransportError::Auth("denied".into())),
            FailureKind::Permanent
        );
        assert_eq!(
            FailureKind::of(&TransportError::Malformed("bad request".into())),
            FailureKind::Permanent
        );
        assert_eq!(
            FailureKind::of(&TransportError::ResourceMissing("group gone".into())),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_delays_double_until_cap() {
        let policy = no_jitter();

        let mut previous = Duration::ZERO;
        for attempt in 1..=4 {
            let delay = policy.delay_for(FailureKind::Throttled, attempt);
            assert!(delay > previous, "attempt {attempt} should back off further");
            previous = delay;
        }
        assert_eq!(
            policy.delay_for(FailureKind::Throttled, 1),
            Duration::from_millis(200)
        );
        assert_eq!(
            policy.delay_for(FailureKind::Throttled, 3),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn test_transient_cap_is_shorter() {
        let policy = no_jitter();

        let throttled = policy.delay_for(FailureKind::Throttled, 12);
        let transient = policy.delay_for(FailureKind::Transient, 12);

        assert_eq!(throttled, policy.throttle_cap);
        assert_eq!(transient, policy.transient_cap);
        assert!(transient < throttled);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..RetryPolicy::default()
        };
        let floor = Duration::from_millis(200);
        let ceiling = Duration::from_millis(300);

        for _ in 0..100 {
            let delay = policy.delay_for(FailureKind::Transient, 1);
            assert!(delay >= floor);
            assert!(delay < ceiling);
        }
    }

    #[test]
    fn test_permanent_gets_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(FailureKind::Permanent, 1),
            Duration::ZERO
        );
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = no_jitter();
        assert_eq!(
            policy.delay_for(FailureKind::Throttled, u32::MAX),
            policy.throttle_cap
        );
    }
}
