use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::FetchError;

/// Retry budget for page loads: attempt count plus an exponential-ish
/// backoff with random jitter between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` failures (1-based).
    /// Doubles per attempt, capped so a large budget cannot sleep forever.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(6);
        let base = self.base_delay.as_millis() as u64 * (1u64 << shift);
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=jitter_ms)
        };
        Duration::from_millis(base + jitter)
    }
}

/// Run `op` under `policy`, sleeping through `sleep` between attempts.
/// The sleep function is injected so tests can observe the schedule
/// without waiting on real time.
pub async fn with_retry<T, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    sleep: S,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(attempt, max = attempts, %err, "fetch attempt failed");
                last = err.to_string();
                if attempt < attempts {
                    sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }
    Err(FetchError::RetriesExhausted { attempts, last })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(100),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let p = policy(64);
        assert_eq!(p.backoff(60), p.backoff(7));
    }

    #[tokio::test]
    async fn first_success_skips_sleeping() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let slept_in = slept.clone();
        let result = with_retry(&policy(3), |d| {
            let slept = slept_in.clone();
            async move {
                slept.lock().unwrap().push(d);
            }
        }, |_| async { Ok::<_, FetchError>(42) })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert!(slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_until_budget_then_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let slept = Arc::new(Mutex::new(Vec::new()));
        let slept_in = slept.clone();
        let result: Result<(), _> = with_retry(
            &policy(3),
            |d| {
                let slept = slept_in.clone();
                async move {
                    slept.lock().unwrap().push(d);
                }
            },
            |_| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Timeout) }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt.
        assert_eq!(
            slept.lock().unwrap().as_slice(),
            &[Duration::from_millis(100), Duration::from_millis(200)]
        );
        match result {
            Err(FetchError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_on_later_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result = with_retry(&policy(3), |_| async {}, move |attempt| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(FetchError::Timeout)
                } else {
                    Ok("rendered".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "rendered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
