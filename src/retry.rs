//! Exponential backoff retry for outbound network calls.
//!
//! Wraps any fallible async operation and retries it while the failure is
//! classified transient (see [`Error::is_transient`]). Non-transient failures
//! propagate immediately; exhausting the attempt budget surfaces the last
//! observed error.
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::error::{Error, Result};
use rand::{rng, Rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// Retry policy: attempt count and backoff shape.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Total attempts, the first call included.
    pub max_attempts: usize,
    /// Initial delay between attempts (doubles each time).
    pub base_delay: Duration,
    /// Cap on a single wait.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Run `op` with retries according to `policy`.
///
/// `what` names the operation in log output (e.g. `"llm.completion"`).
pub async fn with_backoff<T, F, Fut>(policy: &Backoff, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let attempt_t0 = Instant::now();
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempt_ms = attempt_t0.elapsed().as_millis();
                let total_ms = total_t0.elapsed().as_millis();

                if !e.is_transient() {
                    error!(
                        what,
                        attempt,
                        elapsed_ms_attempt = attempt_ms,
                        elapsed_ms_total = total_ms,
                        error = %e,
                        "non-transient failure; not retrying"
                    );
                    return Err(e);
                }

                if attempt >= policy.max_attempts {
                    error!(
                        what,
                        attempt,
                        max = policy.max_attempts,
                        elapsed_ms_attempt = attempt_ms,
                        elapsed_ms_total = total_ms,
                        error = %e,
                        "exhausted retries"
                    );
                    return Err(e);
                }

                // backoff calc
                let mut delay = policy.base_delay.saturating_mul(1 << (attempt - 1));
                if delay > policy.max_delay {
                    delay = policy.max_delay;
                }
                let jitter_ms: u64 = rng().random_range(0..=250);
                let delay = delay + Duration::from_millis(jitter_ms);

                warn!(
                    what,
                    attempt,
                    max = policy.max_attempts,
                    elapsed_ms_attempt = attempt_ms,
                    elapsed_ms_total = total_ms,
                    ?delay,
                    error = %e,
                    "attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> Backoff {
        Backoff {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn api_error(status: u16) -> Error {
        Error::Api {
            service: "test",
            status: StatusCode::from_u16(status).unwrap(),
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_server_error_retried_exactly_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(&fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(500)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_backoff(&fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(404)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(&fast_policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(api_error(429))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_immediate_success_is_single_attempt() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff(&fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
