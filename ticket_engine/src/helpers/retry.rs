use std::{future::Future, time::Duration};

use log::*;

/// Bounded exponential backoff for optimistic-concurrency conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(100), max_delay: Duration::from_millis(800) }
    }
}

impl RetryPolicy {
    /// The pause after the `retry`-th conflict (zero-based): `base_delay * 2^retry`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What a single attempt produced.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// A benign conflict. The operation may be tried again after a pause.
    Retry,
    /// A terminal error. Retrying will not help.
    Fail(E),
}

#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    Exhausted(u32),
    Failed(E),
}

/// Runs `op` until it is `Done` or `Fail`s, or until `policy.max_attempts` attempts all asked to be retried. The
/// closure receives the zero-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    for attempt in 0..policy.max_attempts {
        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(e) => return Err(RetryError::Failed(e)),
            Attempt::Retry if attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!("🔄️ {label}: conflict on attempt {}. Retrying in {}ms", attempt + 1, delay.as_millis());
                tokio::time::sleep(delay).await;
            },
            Attempt::Retry => {
                warn!("🔄️ {label}: conflict on attempt {}. No retries left", attempt + 1);
            },
        }
    }
    Err(RetryError::Exhausted(policy.max_attempts))
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(4) }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(800));
        assert_eq!(policy.delay_for(40), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn succeeds_after_conflicts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> = retry_with_backoff(&fast_policy(), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Attempt::Retry
                } else {
                    Attempt::Done(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = retry_with_backoff(&fast_policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Retry }
        })
        .await;
        assert_eq!(result, Err(RetryError::Exhausted(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = retry_with_backoff(&fast_policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Fail("boom".to_string()) }
        })
        .await;
        assert_eq!(result, Err(RetryError::Failed("boom".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
