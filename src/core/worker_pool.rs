//! Bounded async worker pool for one batch at a time.
//!
//! [`WorkerPool::run_batch`] spawns at most `worker_count` tokio tasks that
//! drain a shared queue of items. The call returns once every worker has
//! finished, so no work outlives the batch. Each item runs in its own task:
//! a panicking item comes back as `Some(Err(PoolError::TaskPanicked))` and
//! its worker moves on to the next item. Items that were never started
//! (because the pool or the shutdown signal closed admission) come back as
//! `None`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::runtime::shutdown::ShutdownSignal;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// One item's task panicked or was cancelled.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Internal error (worker panic, lost results).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result slot for one batch item: `None` if it never started.
pub type BatchSlot<R> = Option<Result<R, PoolError>>;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers used by the most recent batch.
    pub worker_count: usize,

    /// Currently executing items.
    pub active_tasks: u64,

    /// Items waiting for a worker.
    pub queued_tasks: u64,

    /// Total items completed.
    pub completed_tasks: u64,

    /// Total items whose task panicked.
    pub failed_tasks: u64,

    /// Total items submitted.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Per-batch pool of async workers.
#[derive(Debug, Default)]
pub struct WorkerPool {
    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Shutdown flag (lock-free atomic).
    closed: Arc<AtomicBool>,

    /// Worker count of the last batch.
    last_worker_count: AtomicUsize,

    /// External shutdown signal; stops workers from starting new items.
    shutdown: Option<ShutdownSignal>,
}

impl WorkerPool {
    /// Create an open pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop admitting items once `signal` fires.
    #[must_use]
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Run `work` over `items` with at most `worker_count` concurrent workers.
    ///
    /// Results are returned in input order. `None` marks an item that was
    /// never started; `Some(Err(PoolError::TaskPanicked(_)))` marks one whose
    /// task panicked. A panic never affects the other items.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` if the pool was closed before the call
    /// - `PoolError::InvalidConfig` if `worker_count` is zero
    /// - `PoolError::Internal` if result slots are still shared after all workers joined
    pub async fn run_batch<I, R, F, Fut>(
        &self,
        items: Vec<I>,
        worker_count: usize,
        work: F,
    ) -> Result<Vec<BatchSlot<R>>, PoolError>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        if worker_count == 0 {
            return Err(PoolError::InvalidConfig("worker_count must be greater than 0".into()));
        }

        let total = items.len();
        let workers = worker_count.min(total);
        self.last_worker_count.store(workers, Ordering::Relaxed);
        self.counters.submitted_tasks.fetch_add(total as u64, Ordering::Relaxed);
        self.counters.queued_tasks.fetch_add(total as u64, Ordering::Relaxed);

        let queue: Arc<Mutex<VecDeque<(usize, I)>>> = Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let slots: Arc<Mutex<Vec<BatchSlot<R>>>> = Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let work = Arc::new(work);

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let slots = Arc::clone(&slots);
            let work = Arc::clone(&work);
            let counters = Arc::clone(&self.counters);
            let closed = Arc::clone(&self.closed);
            let shutdown = self.shutdown.clone();
            set.spawn(async move {
                loop {
                    if closed.load(Ordering::Acquire) || shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
                        debug!(worker_id, "worker stopping: admission closed");
                        break;
                    }
                    // Brief lock; never held across an await.
                    let next = queue.lock().pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };
                    counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                    // Own task per item so a panic is contained; the set
                    // aborts it if this worker is dropped.
                    let mut item_task = JoinSet::new();
                    item_task.spawn(work(item));
                    let result = match item_task.join_next().await {
                        Some(Ok(value)) => {
                            counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                            Ok(value)
                        }
                        Some(Err(e)) => {
                            error!(worker_id, index, error = %e, "batch item panicked");
                            counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                            Err(PoolError::TaskPanicked(e.to_string()))
                        }
                        None => Err(PoolError::Internal("item task vanished".into())),
                    };
                    counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                    if let Some(slot) = slots.lock().get_mut(index) {
                        *slot = Some(result);
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task failed");
            }
        }

        // Items never picked up are no longer queued.
        let leftover = queue.lock().len() as u64;
        self.counters.queued_tasks.fetch_sub(leftover, Ordering::Relaxed);

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| PoolError::Internal("result slots still shared after join".into()))?;
        Ok(slots.into_inner())
    }

    /// Close the pool; later batches are rejected and running workers stop
    /// after their current item.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(stats = ?self.stats(), "worker pool shut down");
        }
    }

    /// True once [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.last_worker_count.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
        assert_eq!(
            PoolError::InvalidConfig("x".into()).to_string(),
            "invalid configuration: x"
        );
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_tasks.fetch_add(10, Ordering::Relaxed);
        counters.completed_tasks.fetch_add(5, Ordering::Relaxed);

        let stats = counters.snapshot(4);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.submitted_tasks, 10);
        assert_eq!(stats.completed_tasks, 5);
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let pool = WorkerPool::new();
        let out = pool
            .run_batch(vec![3u64, 1, 2], 2, |n| async move {
                tokio::time::sleep(Duration::from_millis(n * 5)).await;
                n * 10
            })
            .await
            .unwrap();
        assert_eq!(out, vec![Some(Ok(30)), Some(Ok(10)), Some(Ok(20))]);
        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 3);
        assert_eq!(stats.queued_tasks, 0);
        assert_eq!(stats.active_tasks, 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = WorkerPool::new();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (l, p) = (Arc::clone(&live), Arc::clone(&peak));
        pool.run_batch((0..8).collect::<Vec<u32>>(), 3, move |_| {
            let (l, p) = (Arc::clone(&l), Arc::clone(&p));
            async move {
                let now = l.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                l.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn closed_pool_rejects_batches() {
        let pool = WorkerPool::new();
        pool.shutdown();
        assert!(pool.is_shutdown());
        let err = pool.run_batch(vec![1], 1, |n: i32| async move { n }).await.unwrap_err();
        assert_eq!(err, PoolError::PoolShutdown);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_admission() {
        let signal = ShutdownSignal::new();
        let pool = WorkerPool::new().with_shutdown(signal.clone());
        let trigger = signal.clone();
        let out = pool
            .run_batch(vec![1, 2, 3], 1, move |n: i32| {
                let trigger = trigger.clone();
                async move {
                    trigger.trigger();
                    n
                }
            })
            .await
            .unwrap();
        assert_eq!(out, vec![Some(Ok(1)), None, None]);
    }

    #[tokio::test]
    async fn panicking_item_does_not_abandon_queue() {
        let pool = WorkerPool::new();
        let out = pool
            .run_batch(vec![0u32, 1, 2], 1, |n| async move {
                assert!(n != 1, "item {n} blew up");
                n
            })
            .await
            .unwrap();
        assert_eq!(out[0], Some(Ok(0)));
        assert!(matches!(out[1], Some(Err(PoolError::TaskPanicked(_)))));
        assert_eq!(out[2], Some(Ok(2)));
        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 2);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.active_tasks, 0);
    }
}
