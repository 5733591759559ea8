//! Timeout Enforcement
//!
//! Provider calls run on a spawned tokio task (the worker) and the caller
//! waits at most the configured duration for it:
//! - A semaphore bounds how many workers exist at once
//! - On expiry the worker is aborted and a timeout error is returned
//! - Worker panics surface as internal errors instead of unwinding the caller
//!
//! ## Limitation
//!
//! Aborting takes effect at the worker's next `.await`. Blocking or CPU-bound
//! code inside the future keeps running until it yields, and keeps its
//! semaphore permit until then, so a misbehaving call can pin a slot.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::WorkerPool;
//!
//! let pool = WorkerPool::new(16, Duration::from_secs(300));
//! let text = pool.run("code generation", async move { backend_call().await }).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::constants::network as net_constants;
use crate::types::{Result, SophiaError};

/// Bounded pool of timed workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(
            net_constants::MAX_CONCURRENT_REQUESTS,
            Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
        )
    }
}

impl WorkerPool {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Workers that may still be started without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `future` on a worker, waiting at most the pool timeout.
    ///
    /// The permit travels with the worker, so an aborted worker that has not
    /// yet yielded still counts against the bound.
    pub async fn run<T, F>(&self, operation_name: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SophiaError::Internal("worker pool is closed".to_string()))?;

        let mut handle = tokio::spawn(async move {
            let _permit = permit;
            future.await
        });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                warn!(operation = operation_name, "Worker panicked");
                Err(SophiaError::Internal(format!(
                    "{} worker panicked",
                    operation_name
                )))
            }
            Ok(Err(_)) => Err(SophiaError::Internal(format!(
                "{} worker was cancelled",
                operation_name
            ))),
            Err(_) => {
                handle.abort();
                warn!(
                    operation = operation_name,
                    timeout_secs = self.timeout.as_secs(),
                    "Worker timed out, aborting"
                );
                Err(SophiaError::timeout(operation_name, self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_run_success() {
        let pool = WorkerPool::new(2, Duration::from_secs(1));
        let result = pool.run("test operation", async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_run_propagates_error() {
        let pool = WorkerPool::default();
        let result: Result<()> = pool
            .run("failing operation", async {
                Err(SophiaError::api("gemini", "boom"))
            })
            .await;
        assert!(matches!(result, Err(SophiaError::Api { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_and_aborts() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let pool = WorkerPool::new(1, Duration::from_secs(5));

        let result = pool
            .run("slow operation", async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(SophiaError::Timeout { operation, duration }) => {
                assert_eq!(operation, "slow operation");
                assert_eq!(duration, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        // Let the aborted worker be reaped, then confirm it never completed
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(pool.available(), 1);
    }

    fn explode() -> SophiaError {
        panic!("worker exploded")
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_internal_error() {
        let pool = WorkerPool::default();
        let result: Result<()> = pool
            .run("panicking operation", async { Err(explode()) })
            .await;
        assert!(matches!(result, Err(SophiaError::Internal(_))));
    }
}
