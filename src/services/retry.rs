use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::warn;

/// Exponential backoff schedule with randomized jitter.
///
/// Both latest-price and historical-range fetches share this; per-call-site
/// backoff loops are deliberately not a thing here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// jittered to 50-150%, capped at `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter = 0.5 + rand::random::<f64>();
        Duration::from_secs_f64(capped.as_secs_f64() * jitter).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run
/// out. The final error is returned as-is; callers decide whether that means
/// "no data" or a real fault.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "transient failure (attempt {}/{}), retrying in {:?}: {}",
                    attempt, policy.max_attempts, delay, e
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_retrying() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&fast_policy(3), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&fast_policy(4), |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("rate limited".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&fast_policy(3), |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&fast_policy(5), |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("forbidden".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_and_stays_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        for attempt in 1..=8 {
            let d = policy.delay_for(attempt);
            assert!(d >= Duration::from_millis(50), "jitter floor at attempt {attempt}");
            assert!(d <= Duration::from_millis(500), "cap at attempt {attempt}");
        }
    }
}
