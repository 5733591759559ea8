//! Retry Executor
//!
//! Runs one provider call through the [`WorkerPool`] and retries transient
//! failures with capped exponential backoff and random jitter.
//!
//! ## Strategy
//!
//! 1. Run the attempt on a timed worker
//! 2. On success after retries, record them in the request metadata
//! 3. On a non-retryable error, or on the last attempt, propagate the error
//! 4. Otherwise sleep `min(max, base^(attempt-1))` plus jitter and try again

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use super::meta;
use super::timeout::WorkerPool;
use crate::config::{AiConfig, RetryConfig};
use crate::types::Result;

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Base of the exponential backoff (seconds)
    pub backoff_base: f64,
    /// Cap on the backoff before jitter
    pub backoff_max: Duration,
    /// Upper bound of the uniform jitter
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            backoff_max: Duration::from_secs_f64(config.backoff_max_secs),
            jitter_max: Duration::from_secs_f64(config.jitter_max_secs),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt `attempt` (1-based), without jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.backoff_base.powi(exponent);
        std::cmp::min(Duration::from_secs_f64(secs), self.backoff_max)
    }

    /// Full sleep before the next attempt
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt) + random_jitter(self.jitter_max)
    }
}

/// Uniform jitter in `[0, max)` using the thread-local RNG
fn random_jitter(max: Duration) -> Duration {
    let max_secs = max.as_secs_f64();
    if max_secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::rng().random_range(0.0..max_secs))
}

/// Timeout + retry executor shared by both provider adapters
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    pool: WorkerPool,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), WorkerPool::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, pool: WorkerPool) -> Self {
        Self { policy, pool }
    }

    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(
            RetryPolicy::from(&config.retry),
            WorkerPool::new(config.max_concurrent_requests, config.request_timeout()),
        )
    }

    /// Run `attempt` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `attempt` builds a fresh future for every try. Retries performed before
    /// a success are added to the current request metadata.
    #[instrument(skip(self, attempt), fields(max_attempts = self.policy.max_attempts))]
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt_number = 1;

        loop {
            debug!(attempt = attempt_number, max_attempts, "Provider attempt");

            match self.pool.run(operation_name, attempt()).await {
                Ok(value) => {
                    if attempt_number > 1 {
                        meta::record_retries(attempt_number - 1);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt_number >= max_attempts {
                        error!(
                            operation = operation_name,
                            attempt = attempt_number,
                            category = %err.category(),
                            error = %err,
                            "Provider call failed"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_with_jitter(attempt_number);
                    warn!(
                        operation = operation_name,
                        attempt = attempt_number,
                        max_attempts,
                        delay_secs = format!("{:.1}", delay.as_secs_f64()),
                        error = %err,
                        "Transient error, retrying"
                    );
                    sleep(delay).await;
                    attempt_number += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::meta::{RequestMeta, scoped};
    use crate::types::{ProviderKind, SophiaError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(timeout: Duration) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::default(), WorkerPool::new(4, timeout))
    }

    /// Fails with `error` for the first `failures` calls, then succeeds
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
        error: fn() -> SophiaError,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<String>> + Send>> {
        move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(error())
                } else {
                    Ok("done".to_string())
                }
            })
        }
    }

    fn server_error() -> SophiaError {
        SophiaError::api("gemini", "503 Service Unavailable")
    }

    fn auth_error() -> SophiaError {
        SophiaError::http("minimax", 401, "Authentication failed: invalid api key")
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs_f64(1.5));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs_f64(2.25));
        // Capped at 8 seconds
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(8));
    }

    #[test]
    fn test_random_jitter_bounds() {
        for _ in 0..100 {
            let jitter = random_jitter(Duration::from_millis(500));
            assert!(jitter < Duration::from_millis(500));
        }
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_records_meta() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(300));

        let (result, meta) = scoped(
            ProviderKind::Gemini,
            exec.execute("code generation", flaky(Arc::clone(&calls), 2, server_error)),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(meta.retried);
        assert_eq!(meta.retry_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success_leaves_meta_clean() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(300));

        let (result, meta) = scoped(
            ProviderKind::Gemini,
            exec.execute("code generation", flaky(Arc::clone(&calls), 0, server_error)),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(meta, RequestMeta::new(ProviderKind::Gemini));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(300));

        let (result, meta) = scoped(
            ProviderKind::Gemini,
            exec.execute("code generation", flaky(Arc::clone(&calls), 10, server_error)),
        )
        .await;

        assert!(matches!(result, Err(SophiaError::Api { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!meta.retried);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(300));

        let result = exec
            .execute("code generation", flaky(Arc::clone(&calls), 10, auth_error))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(300));
        let start = tokio::time::Instant::now();

        let result = exec
            .execute("code generation", flaky(Arc::clone(&calls), 2, server_error))
            .await;
        assert!(result.is_ok());

        // 1s + 1.5s of backoff plus at most 2 x 0.5s jitter
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs_f64(2.5));
        assert!(elapsed < Duration::from_secs_f64(3.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(Duration::from_secs(5));
        let counter = Arc::clone(&calls);

        let (result, meta) = scoped(
            ProviderKind::MiniMax,
            exec.execute("code explanation", move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok("late".to_string())
                }
            }),
        )
        .await;

        assert_eq!(result.unwrap(), "late");
        assert_eq!(meta.retry_attempts, 1);
        assert_eq!(meta.provider, ProviderKind::MiniMax);
    }
}
