//! Bounded retry for retryable storage failures. Business and not-found
//! errors pass through untouched; only infrastructure errors are retried,
//! and only up to the configured attempt bound.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use tracing::warn;

use stockbook_shared::config::RetryConfig;
use stockbook_shared::error::{Error, Result};

pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_delay)
        .with_max_interval(config.max_delay)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or(config.max_delay);
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "retryable storage failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_retryable() => {
                return Err(Error::Infrastructure(format!(
                    "{operation_name} failed after {attempt} attempts: {err}"
                )));
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_eventually_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast_config(), "op", || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Infrastructure("flaky".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_never_retry() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_config(), "op", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::InventoryNotFound)
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "INVENTORY_NOT_FOUND");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_bound_is_enforced() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_config(), "op", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Infrastructure("down".into()))
        })
        .await;
        assert_eq!(result.unwrap_err().code(), "INFRASTRUCTURE_FAILURE");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
