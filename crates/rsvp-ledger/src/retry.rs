//! Bounded retry with exponential backoff for transient store failures.
//!
//! Only failures the store classifies as transient (lock timeouts, an
//! unavailable backend or registry) are retried. Capacity and precondition
//! rejections return after the first attempt.

use std::thread::sleep;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AttemptError, LedgerError};

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay_ms`: 10
/// - `max_delay_ms`: 200
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 10,
            max_delay_ms: 200,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based).
    ///
    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.initial_delay_ms as f64;
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let multiplied = base * self.multiplier.powi(exponent);
        let clamped = multiplied.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(clamped as u64)
    }
}

/// Run `attempt` until it succeeds, fails permanently, exhausts the policy,
/// or would sleep past `deadline`.
///
/// `attempt` receives the one-based attempt number.
pub(crate) fn with_retry<T>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    operation: &'static str,
    mut attempt: impl FnMut(u32) -> Result<T, AttemptError>,
) -> Result<T, LedgerError> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let err = match attempt(attempts) {
            Ok(value) => {
                if attempts > 1 {
                    debug!(operation, attempts, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err.finish(attempts));
        }

        let retries_done = attempts - 1;
        if retries_done >= policy.max_retries {
            warn!(operation, attempts, error = ?err, "transient failure; retries exhausted");
            return Err(err.finish(attempts));
        }

        let delay = policy.delay_for_retry(retries_done);
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                warn!(operation, attempts, error = ?err, "transient failure; deadline reached");
                return Err(err.finish(attempts));
            }
        }

        warn!(
            operation,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = ?err,
            "transient failure; retrying"
        );
        sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsvp_store::StoreError;
    use rsvp_types::EventId;

    fn timeout() -> AttemptError {
        AttemptError::Store(StoreError::LockTimeout {
            event: EventId::new(1),
        })
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_retry(10), Duration::from_millis(200));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let mut calls = 0;
        let result = with_retry(&fast(), None, "test", |_| {
            calls += 1;
            if calls < 3 {
                Err(timeout())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&fast(), None, "test", |_| {
            calls += 1;
            Err(timeout())
        });
        assert_eq!(calls, 4);
        assert!(matches!(
            result.unwrap_err(),
            LedgerError::Transient { attempts: 4, .. }
        ));
    }

    #[test]
    fn rejections_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry(&fast(), None, "test", |_| {
            calls += 1;
            Err(AttemptError::Rejected(LedgerError::EventNotFound(EventId::new(9))))
        });
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err(), LedgerError::EventNotFound(EventId::new(9)));
    }

    #[test]
    fn deadline_stops_retrying() {
        let policy = RetryPolicy {
            initial_delay_ms: 50,
            max_delay_ms: 50,
            ..RetryPolicy::default()
        };
        let mut calls = 0;
        let deadline = Instant::now() + Duration::from_millis(10);
        let result: Result<(), _> = with_retry(&policy, Some(deadline), "test", |_| {
            calls += 1;
            Err(timeout())
        });
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_retryable());
    }

    #[test]
    fn policy_reads_from_partial_toml() {
        let policy: RetryPolicy = toml::from_str("max_retries = 5").unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay_ms, 10);
    }
}
