use std::future::Future;
use std::time::Duration;
use tracing::warn;
use voya_core::CoreResult;

/// Bounded retry for operations that lost a race on the trip lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// `base_delay * multiplier^(attempts - 1)`, where `attempts` is the
    /// number of attempts already made.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * self.multiplier.powi(exponent))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last error is returned as is.
pub async fn with_conflict_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                let delay = policy.next_delay(attempt);
                warn!(
                    "{} hit a conflict (attempt {}/{}), retrying in {:?}: {}",
                    operation, attempt, policy.attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use voya_core::CoreError;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Duration::from_millis(50));
        assert_eq!(policy.next_delay(2), Duration::from_millis(100));
        assert_eq!(policy.next_delay(3), Duration::from_millis(200));
        // attempts = 0 behaves like the first retry
        assert_eq!(policy.next_delay(0), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = with_conflict_retry(&policy, "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::ConcurrencyConflict("busy".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: CoreResult<()> = with_conflict_retry(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::ConcurrencyConflict("busy".to_string()))
        })
        .await;

        assert!(matches!(result, Err(CoreError::ConcurrencyConflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: CoreResult<()> =
            with_conflict_retry(&RetryPolicy::default(), "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::InvalidRoomCount)
            })
            .await;

        assert_eq!(result, Err(CoreError::InvalidRoomCount));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
