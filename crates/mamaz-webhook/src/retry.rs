//! Exponential backoff for fallible async operations.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Doubling stops here, so the longest wait is `base_delay * 64`.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait after attempt `n` is `base_delay * 2^n`, capped at 64x.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(1 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. Returns the last error on
/// exhaustion; no sleep happens after the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{label}: attempt {attempt}/{} failed: {e}", policy.attempts);
                if attempt >= policy.attempts {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_for_long_runs() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(6), Duration::from_secs(64));
        assert_eq!(policy.delay_for(7), Duration::from_secs(64));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(64));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_two_then_four_seconds() {
        let started = Instant::now();
        let calls: Arc<Mutex<Vec<Duration>>> = Arc::default();

        let seen = calls.clone();
        let result: Result<&str, String> =
            retry_with_backoff(RetryPolicy::default(), "test", move |attempt| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(started.elapsed());
                    if attempt < 3 {
                        Err(format!("fail {attempt}"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Duration::ZERO);
        assert_eq!(calls[1], Duration::from_secs(2));
        assert_eq!(calls[2], Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_without_trailing_sleep() {
        let started = Instant::now();
        let result: Result<(), String> =
            retry_with_backoff(RetryPolicy::default(), "test", |attempt| async move {
                Err(format!("fail {attempt}"))
            })
            .await;

        assert_eq!(result.unwrap_err(), "fail 3");
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }
}
