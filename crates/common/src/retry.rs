//! Bounded retry loop.
//!
//! The loop carries an explicit attempt counter and gives up after
//! `max_attempts`.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try and how long to pause between tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_millis(500),
        }
    }
}

/// Outcome of a retry loop that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; holds the last one.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error the predicate refused to retry.
    #[error("non-retryable error on attempt {attempt}: {error}")]
    Fatal { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// The underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Run `op` until it succeeds, the predicate rejects the error, or the policy
/// runs out of attempts.
///
/// # Arguments
/// * `policy` - Attempt bound and inter-attempt pause
/// * `label` - Name used in log lines
/// * `is_retryable` - Decides whether an error is worth another attempt
/// * `op` - Produces a fresh future per attempt
pub async fn retry_bounded<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !is_retryable(&error) => {
                return Err(RetryError::Fatal { attempt, error });
            }
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn always(_: &String) -> bool {
        true
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            retry_bounded(RetryPolicy::default(), "test", always, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("fail {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            interval: Duration::from_millis(10),
        };
        let result: Result<(), _> =
            retry_bounded(policy, "test", always, |_| async { Err("boom".to_string()) }).await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_fatal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_bounded(
            RetryPolicy::default(),
            "test",
            |e: &String| e != "fatal",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal { attempt: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            interval: Duration::ZERO,
        };
        let result: Result<(), _> =
            retry_bounded(policy, "test", always, |_| async { Err("x".to_string()) }).await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
    }
}
