//! Bounded exponential backoff over the provider error taxonomy.
//!
//! Only [`ErrorKind::RateLimit`](crate::providers::ErrorKind) and
//! `Transient` failures are retried. Each wait is the larger of the backoff
//! step and the server's retry-after hint, and the whole sequence (attempts
//! plus waits) is capped by the policy's wall-clock budget.

use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use tokio::time::Instant;

use crate::config::RetryPolicy;
use crate::providers::ProviderError;

/// The final error and how many attempts were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error: ProviderError,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out
/// of retries, or would exceed the wall-clock budget.
///
/// `op` receives the 1-based attempt number. On success the value is
/// returned with the number of attempts made.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let started = Instant::now();
    let mut backoff = ExponentialBuilder::default()
        .with_min_delay(policy.initial_backoff)
        .with_max_delay(policy.max_backoff)
        .with_max_times(policy.max_retries as usize)
        .build();

    let mut attempt = 0;
    loop {
        attempt += 1;

        let remaining = policy.total_budget.saturating_sub(started.elapsed());
        let outcome = match tokio::time::timeout(remaining, op(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Transient(format!(
                "call exceeded the {}s retry budget",
                policy.total_budget.as_secs()
            ))),
        };

        let error = match outcome {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => e,
        };

        if !error.kind().is_retryable() {
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }

        let Some(step) = backoff.next() else {
            tracing::warn!(attempts = attempt, kind = %error.kind(), "Retries exhausted");
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        };

        let delay = error.retry_after().map_or(step, |hint| hint.max(step));
        if started.elapsed().saturating_add(delay) >= policy.total_budget {
            tracing::warn!(
                attempts = attempt,
                delay_ms = delay.as_millis() as u64,
                budget_ms = policy.total_budget.as_millis() as u64,
                "Retry budget exhausted"
            );
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }

        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            kind = %error.kind(),
            error = %error,
            "Retrying after failure"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::ProviderName;
    use std::time::Duration;

    fn rate_limited(retry_after: Option<Duration>) -> ProviderError {
        ProviderError::RateLimited {
            provider: ProviderName::Claude,
            retry_after,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let started = Instant::now();
        let (value, attempts) = with_retry(&RetryPolicy::default(), |attempt| async move {
            if attempt < 3 {
                Err(rate_limited(None))
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        // 1s then 2s of backoff
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_honored() {
        let started = Instant::now();
        let (_, attempts) = with_retry(&RetryPolicy::default(), |attempt| async move {
            if attempt == 1 {
                Err(rate_limited(Some(Duration::from_secs(5))))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts, 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_after_gives_up_instead_of_waiting() {
        let failure = with_retry(&RetryPolicy::default(), |_| async {
            Err::<(), _>(rate_limited(Some(Duration::MAX)))
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(matches!(failure.error, ProviderError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_and_invalid_response_not_retried() {
        for error in [
            ProviderError::auth("bad key"),
            ProviderError::InvalidResponse("not json".to_string()),
        ] {
            let expected = error.clone();
            let failure = with_retry(&RetryPolicy::default(), |_| {
                let error = error.clone();
                async move { Err::<(), _>(error) }
            })
            .await
            .unwrap_err();

            assert_eq!(failure.attempts, 1);
            assert_eq!(failure.error, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let failure = with_retry(&RetryPolicy::default(), |_| async {
            Err::<(), _>(ProviderError::Transient("503".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.error, ProviderError::Transient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_budget_caps_retries() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            total_budget: Duration::from_secs(2),
        };
        let failure = with_retry(&policy, |_| async {
            Err::<(), _>(ProviderError::Transient("timeout".to_string()))
        })
        .await
        .unwrap_err();

        // Waits 1s after the first attempt; the next 2s wait would exceed the budget
        assert_eq!(failure.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_bounded_by_budget() {
        let policy = RetryPolicy {
            total_budget: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        let failure = with_retry(&policy, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ProviderError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(failure.error.to_string().contains("retry budget"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retries_policy() {
        let failure = with_retry(&RetryPolicy::none(), |_| async {
            Err::<(), _>(rate_limited(None))
        })
        .await
        .unwrap_err();
        assert_eq!(failure.attempts, 1);
    }
}
