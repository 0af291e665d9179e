//! Bounded retries with exponential backoff for provider calls

use log::{trace, warn};
use std::future::Future;

use crate::config::RetryConfig;
use crate::errors::ProviderError;

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryConfig,
    description: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        trace!("Running {} (attempt {})", description, attempt);

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_attempts {
            return Err(ProviderError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            "{} failed (attempt {}/{}), retrying in {:?}: {}",
            description, attempt, max_attempts, delay, err
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = with_retries(&fast_policy(5), "describe", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Transient("Throttling".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = with_retries(&fast_policy(5), "describe", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Rejected("AuthFailure".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_wrap_last_error() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = with_retries(&fast_policy(3), "describe", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transient("RequestLimitExceeded".to_string()))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            err.to_string(),
            "after 3 attempts, operation failed: RequestLimitExceeded"
        );
    }
}
