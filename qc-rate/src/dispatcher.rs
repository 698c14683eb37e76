//! Background task dispatcher
//!
//! Runs selection queries off the request path. `submit` returns a
//! [`TaskHandle`] immediately; the job runs on the tokio runtime behind a
//! semaphore sized to the configured worker count. `redeem` waits for the
//! result with a bounded timeout.
//!
//! A handle is single-use: a successful (or failed) redeem consumes it. A
//! timed-out redeem leaves it in place so the caller can try again.
//! Results nobody redeems are dropped after `result_ttl`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

/// Unclaimed results older than this are pruned
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(600);

/// Opaque reference to a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Result not ready within the wait; the handle remains redeemable
    #[error("Task {0} not finished within {1:?}")]
    Timeout(TaskHandle, Duration),

    /// Never issued, already redeemed, or expired
    #[error("Unknown task handle {0}")]
    UnknownHandle(TaskHandle),

    /// Job ended without producing a result (panic or runtime shutdown)
    #[error("Task {0} ended without a result")]
    WorkerLost(TaskHandle),
}

struct PendingTask<T> {
    rx: oneshot::Receiver<T>,
    submitted_at: Instant,
}

struct Inner<T> {
    next_id: AtomicU64,
    workers: Arc<Semaphore>,
    pending: Mutex<HashMap<u64, PendingTask<T>>>,
    result_ttl: Duration,
}

/// Handle-based job runner
///
/// Cloning is cheap; clones share the worker pool and pending results.
pub struct TaskDispatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> TaskDispatcher<T> {
    pub fn new(worker_count: usize) -> Self {
        Self::with_result_ttl(worker_count, DEFAULT_RESULT_TTL)
    }

    pub fn with_result_ttl(worker_count: usize, result_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                workers: Arc::new(Semaphore::new(worker_count.max(1))),
                pending: Mutex::new(HashMap::new()),
                result_ttl,
            }),
        }
    }

    /// Queue `job` and return its handle without waiting
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, job: F) -> TaskHandle
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = TaskHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let workers = Arc::clone(&self.inner.workers);

        tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            // Receiver gone means the handle was pruned or abandoned
            if tx.send(job.await).is_err() {
                debug!(%handle, "Result discarded, handle no longer pending");
            }
        });

        let mut pending = self.lock_pending();
        self.prune_expired(&mut pending);
        pending.insert(
            handle.0,
            PendingTask {
                rx,
                submitted_at: Instant::now(),
            },
        );

        debug!(%handle, pending = pending.len(), "Task submitted");
        handle
    }

    /// Wait up to `timeout` for the result of `handle`
    pub async fn redeem(&self, handle: TaskHandle, timeout: Duration) -> Result<T, DispatchError> {
        let mut task = self
            .lock_pending()
            .remove(&handle.0)
            .ok_or(DispatchError::UnknownHandle(handle))?;

        match tokio::time::timeout(timeout, &mut task.rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => {
                warn!(%handle, "Task ended without a result");
                Err(DispatchError::WorkerLost(handle))
            }
            Err(_) => {
                self.lock_pending().insert(handle.0, task);
                Err(DispatchError::Timeout(handle, timeout))
            }
        }
    }

    /// Handles submitted but not yet redeemed
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingTask<T>>> {
        // Critical sections never panic midway, so a poisoned map is still consistent
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune_expired(&self, pending: &mut HashMap<u64, PendingTask<T>>) {
        let ttl = self.inner.result_ttl;
        let before = pending.len();
        pending.retain(|_, task| task.submitted_at.elapsed() < ttl);
        let pruned = before - pending.len();
        if pruned > 0 {
            debug!(pruned, "Pruned unclaimed task results");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_then_redeem() {
        let dispatcher = TaskDispatcher::new(2);
        let handle = dispatcher.submit(async { 40 + 2 });

        let result = dispatcher.redeem(handle, Duration::from_secs(5)).await;

        assert_eq!(result, Ok(42));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handles_are_distinct() {
        let dispatcher = TaskDispatcher::new(1);
        let a = dispatcher.submit(async { "a" });
        let b = dispatcher.submit(async { "b" });

        assert_ne!(a, b);
        assert_eq!(dispatcher.redeem(b, Duration::from_secs(5)).await, Ok("b"));
        assert_eq!(dispatcher.redeem(a, Duration::from_secs(5)).await, Ok("a"));
    }

    #[tokio::test]
    async fn test_handle_is_single_use() {
        let dispatcher = TaskDispatcher::new(1);
        let handle = dispatcher.submit(async { 1 });

        dispatcher.redeem(handle, Duration::from_secs(5)).await.unwrap();
        let again = dispatcher.redeem(handle, Duration::from_secs(5)).await;

        assert_eq!(again, Err(DispatchError::UnknownHandle(handle)));
    }

    #[tokio::test]
    async fn test_timeout_keeps_handle_redeemable() {
        let dispatcher = TaskDispatcher::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let handle = dispatcher.submit(async move {
            let _ = release_rx.await;
            7
        });

        let first = dispatcher.redeem(handle, Duration::from_millis(20)).await;
        assert_eq!(first, Err(DispatchError::Timeout(handle, Duration::from_millis(20))));
        assert_eq!(dispatcher.pending_count(), 1);

        release_tx.send(()).unwrap();
        let second = dispatcher.redeem(handle, Duration::from_secs(5)).await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_worker_count_bounds_concurrency() {
        let dispatcher = TaskDispatcher::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let blocker = dispatcher.submit(async move {
            let _ = release_rx.await;
            0
        });
        let queued = dispatcher.submit(async { 1 });

        // The only worker is busy, so the second job cannot start
        let waited = dispatcher.redeem(queued, Duration::from_millis(30)).await;
        assert!(matches!(waited, Err(DispatchError::Timeout(..))));

        release_tx.send(()).unwrap();
        assert_eq!(dispatcher.redeem(blocker, Duration::from_secs(5)).await, Ok(0));
        assert_eq!(dispatcher.redeem(queued, Duration::from_secs(5)).await, Ok(1));
    }

    #[tokio::test]
    async fn test_panicking_job_reports_worker_lost() {
        let dispatcher: TaskDispatcher<u8> = TaskDispatcher::new(1);
        let handle = dispatcher.submit(async {
            let value: Option<u8> = None;
            value.expect("selection blew up")
        });

        let result = dispatcher.redeem(handle, Duration::from_secs(5)).await;

        assert_eq!(result, Err(DispatchError::WorkerLost(handle)));
    }

    #[tokio::test]
    async fn test_expired_results_are_pruned_on_submit() {
        let dispatcher = TaskDispatcher::with_result_ttl(1, Duration::from_millis(10));
        let stale = dispatcher.submit(async { 1 });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = dispatcher.submit(async { 2 });

        assert_eq!(dispatcher.pending_count(), 1);
        assert_eq!(
            dispatcher.redeem(stale, Duration::from_secs(1)).await,
            Err(DispatchError::UnknownHandle(stale))
        );
        assert_eq!(dispatcher.redeem(fresh, Duration::from_secs(5)).await, Ok(2));
    }
}
