use anyhow::{Error, anyhow};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::debug;

/// Fixed-backoff retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry attempts after the first failure (total runs = 1 + retries).
    pub retries: usize,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: crate::DEFAULT_RETRIES,
            backoff: crate::DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Retries an async operation until it succeeds, the attempts run out or
/// `deadline` passes.
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: Number of retries and the delay between them
/// - `deadline`: No attempt starts, and no running attempt is awaited, past it
///
/// # Returns
/// Either the successful result or the error of the last attempt. A deadline
/// hit reports "deadline exceeded" along with the last attempt error, if any.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    policy: RetryPolicy,
    deadline: Instant,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    let mut last_err: Option<Error> = None;
    loop {
        if Instant::now() >= deadline {
            return Err(deadline_exceeded(attempt - 1, last_err));
        }

        let err = match timeout_at(deadline, operation()).await {
            Ok(Ok(val)) => return Ok(val),
            Ok(Err(err)) => err,
            Err(_) => return Err(deadline_exceeded(attempt, last_err)),
        };

        if attempt > policy.retries {
            return Err(err);
        }
        debug!(
            "Attempt {}/{} failed: {:#}. Retrying...",
            attempt,
            policy.retries + 1,
            err
        );
        last_err = Some(err);
        attempt += 1;
        sleep_until(deadline.min(Instant::now() + policy.backoff)).await;
    }
}

fn deadline_exceeded(attempts: usize, last_err: Option<Error>) -> Error {
    match last_err {
        Some(err) => anyhow!("deadline exceeded after {attempts} attempt(s), last error: {err:#}"),
        None => anyhow!("deadline exceeded after {attempts} attempt(s)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(retries: usize, backoff_ms: u64) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_succeeds_after_failure() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow!("boom"))
                } else {
                    Ok(42)
                }
            },
            policy(1, 1),
            far_deadline(),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("failure {n}"))
            },
            policy(2, 1),
            far_deadline(),
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_attempts() {
        let calls = AtomicUsize::new(0);
        let deadline = Instant::now();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let result: Result<(), _> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            policy(1, 1),
            deadline,
        )
        .await;

        assert!(result.unwrap_err().to_string().starts_with("deadline exceeded"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_backoff() {
        let calls = AtomicUsize::new(0);
        let deadline = Instant::now() + Duration::from_secs(10);

        let result: Result<(), _> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("unavailable"))
            },
            policy(5, 30_000),
            deadline,
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert_eq!(
            err,
            "deadline exceeded after 1 attempt(s), last error: unavailable"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_attempt() {
        let deadline = Instant::now() + Duration::from_secs(1);

        let result: Result<(), _> = with_retry(
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            policy(0, 0),
            deadline,
        )
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "deadline exceeded after 1 attempt(s)"
        );
    }
}
