//! Resubmission policy for retryable status codes.
//!
//! [`RetryCoordinator`] decides whether a request that received a retryable
//! status should be resent and after how long. Rate-limit responses (`429`)
//! and transient conflicts (`596`) share the same mechanics but draw their
//! delays from separate [`BackoffConfig`]s.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    frame::{RequestId, RequestIdGenerator},
    status::ResponseStatusCode,
};

/// Exponential back-off timing for one class of retryable status.
///
/// The delay starts at `initial_delay` and doubles on each attempt, capped
/// at `max_delay`.
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay used for the first resubmission.
    pub initial_delay: Duration,
    /// Upper bound once delays have increased exponentially.
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Default timing for `429 Too Many Requests`.
    pub const RATE_LIMIT: BackoffConfig = BackoffConfig {
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(10),
    };

    /// Default timing for `596` transient server conflicts.
    pub const CONFLICT: BackoffConfig = BackoffConfig {
        initial_delay: Duration::from_millis(25),
        max_delay: Duration::from_secs(1),
    };

    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use graphwire::retry::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Un-jittered delay before resubmission number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Limits applied to every retryable request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of resubmissions per logical request.
    pub max_attempts: u32,
    /// Maximum cumulative back-off across all resubmissions.
    pub max_total_wait: Duration,
    /// Timing for rate-limit responses.
    pub rate_limit: BackoffConfig,
    /// Timing for transient conflict responses.
    pub conflict: BackoffConfig,
    /// Randomise each delay within `[50%, 100%]` of its exponential value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_total_wait: Duration::from_secs(30),
            rate_limit: BackoffConfig::RATE_LIMIT,
            conflict: BackoffConfig::CONFLICT,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Normalise both back-off configurations.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.rate_limit = self.rate_limit.normalized();
        self.conflict = self.conflict.normalized();
        self
    }

    fn backoff_for(&self, status: ResponseStatusCode) -> &BackoffConfig {
        match status {
            ResponseStatusCode::TooManyRequests => &self.rate_limit,
            _ => &self.conflict,
        }
    }
}

/// Per-request retry bookkeeping, owned by the pending entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Resubmissions performed so far.
    pub attempt: u32,
    /// Delay applied before the most recent resubmission.
    pub next_delay: Duration,
    /// Sum of all delays applied so far.
    pub total_wait: Duration,
}

/// Outcome of [`RetryCoordinator::on_retryable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Resend the original payload under `request_id` once `delay` elapses.
    Resubmit {
        /// Fresh wire identifier for the next attempt.
        request_id: RequestId,
        /// Back-off to wait before sending.
        delay: Duration,
    },
    /// The retry budget is spent.
    GiveUp,
}

/// Applies a [`RetryPolicy`] to retryable responses.
#[derive(Debug)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
    ids: Arc<RequestIdGenerator>,
    jitter_seed: AtomicU64,
}

impl RetryCoordinator {
    /// Create a coordinator allocating fresh identifiers from `ids`.
    #[must_use]
    pub fn new(policy: RetryPolicy, ids: Arc<RequestIdGenerator>) -> Self {
        Self {
            policy: policy.normalized(),
            ids,
            jitter_seed: AtomicU64::new(1),
        }
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy { &self.policy }

    /// Decide how to handle a retryable `status` for a request whose retry
    /// bookkeeping is `state`.
    ///
    /// On [`Decision::Resubmit`] `state` is advanced; on
    /// [`Decision::GiveUp`] it is left untouched.
    pub fn on_retryable(&self, state: &mut RetryState, status: ResponseStatusCode) -> Decision {
        if state.attempt >= self.policy.max_attempts {
            return Decision::GiveUp;
        }
        let base = self.policy.backoff_for(status).delay_for(state.attempt);
        let delay = if self.policy.jitter {
            self.jittered(base)
        } else {
            base
        };
        let total_wait = state.total_wait.saturating_add(delay);
        if total_wait > self.policy.max_total_wait {
            return Decision::GiveUp;
        }
        state.attempt += 1;
        state.next_delay = delay;
        state.total_wait = total_wait;
        Decision::Resubmit {
            request_id: self.ids.next_id(),
            delay,
        }
    }

    /// Spread `base` over `[base / 2, base]`.
    fn jittered(&self, base: Duration) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        if base_ms <= 1 {
            return base;
        }
        let low = base_ms / 2;
        let width = base_ms - low;
        let seed = self.jitter_seed.fetch_add(1, Ordering::Relaxed);
        let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407;
        Duration::from_millis(low + mixed % (width + 1))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[fixture]
    fn ids() -> Arc<RequestIdGenerator> { Arc::new(RequestIdGenerator::starting_at(100)) }

    #[rstest]
    #[case(0, Duration::from_millis(25))]
    #[case(1, Duration::from_millis(50))]
    #[case(3, Duration::from_millis(200))]
    #[case(10, Duration::from_secs(1))]
    #[case(u32::MAX, Duration::from_secs(1))]
    fn conflict_backoff_doubles_and_caps(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(BackoffConfig::CONFLICT.delay_for(attempt), expected);
    }

    #[test]
    fn rate_limit_backoff_exceeds_conflict_backoff() {
        for attempt in 0..5 {
            assert!(
                BackoffConfig::RATE_LIMIT.delay_for(attempt)
                    > BackoffConfig::CONFLICT.delay_for(attempt)
            );
        }
    }

    #[rstest]
    fn resubmits_until_attempts_exhausted(ids: Arc<RequestIdGenerator>) {
        let coordinator = RetryCoordinator::new(policy(2), ids);
        let mut state = RetryState::default();

        let first = coordinator.on_retryable(&mut state, ResponseStatusCode::TooManyRequests);
        assert_eq!(
            first,
            Decision::Resubmit {
                request_id: RequestId::new(100),
                delay: Duration::from_millis(500),
            }
        );
        let second = coordinator.on_retryable(&mut state, ResponseStatusCode::TooManyRequests);
        assert_eq!(
            second,
            Decision::Resubmit {
                request_id: RequestId::new(101),
                delay: Duration::from_secs(1),
            }
        );
        assert_eq!(state.attempt, 2);
        assert_eq!(
            coordinator.on_retryable(&mut state, ResponseStatusCode::TooManyRequests),
            Decision::GiveUp
        );
        assert_eq!(state.attempt, 2);
    }

    #[rstest]
    fn gives_up_when_total_wait_would_be_exceeded(ids: Arc<RequestIdGenerator>) {
        let coordinator = RetryCoordinator::new(
            RetryPolicy {
                max_total_wait: Duration::from_millis(600),
                ..policy(10)
            },
            ids,
        );
        let mut state = RetryState::default();
        assert!(matches!(
            coordinator.on_retryable(&mut state, ResponseStatusCode::TooManyRequests),
            Decision::Resubmit { .. }
        ));
        assert_eq!(
            coordinator.on_retryable(&mut state, ResponseStatusCode::TooManyRequests),
            Decision::GiveUp
        );
    }

    #[rstest]
    fn jitter_stays_within_bounds(ids: Arc<RequestIdGenerator>) {
        let coordinator = RetryCoordinator::new(
            RetryPolicy {
                jitter: true,
                ..policy(u32::MAX)
            },
            ids,
        );
        let base = Duration::from_millis(400);
        for _ in 0..64 {
            let delay = coordinator.jittered(base);
            assert!(delay >= Duration::from_millis(200) && delay <= base);
        }
    }

    #[test]
    fn normalizes_inverted_backoff() {
        let coordinator = RetryCoordinator::new(
            RetryPolicy {
                conflict: BackoffConfig {
                    initial_delay: Duration::from_secs(2),
                    max_delay: Duration::ZERO,
                },
                ..RetryPolicy::default()
            },
            Arc::new(RequestIdGenerator::default()),
        );
        assert_eq!(
            coordinator.policy().conflict.initial_delay,
            Duration::from_millis(1)
        );
    }
}
