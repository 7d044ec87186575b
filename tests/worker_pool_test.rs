//! Integration tests for WorkerPool
//!
//! These tests validate:
//! - Results come back in input order
//! - The worker count bounds concurrency
//! - Shutdown stops admission but lets started items finish
//! - A panicking item fails alone while its worker keeps draining
//! - Closed pools and zero workers are rejected

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roster_scheduler::core::{PoolError, WorkerPool};
use roster_scheduler::runtime::ShutdownSignal;

#[tokio::test]
async fn test_results_preserve_input_order() {
    let pool = WorkerPool::new();
    let results = pool
        .run_batch((0..10u64).collect(), 3, |n| async move {
            // Later items finish first.
            tokio::time::sleep(Duration::from_millis(20 - n * 2)).await;
            n * n
        })
        .await
        .unwrap();

    let values: Vec<u64> = results.into_iter().map(|slot| slot.unwrap().unwrap()).collect();
    assert_eq!(values, (0..10u64).map(|n| n * n).collect::<Vec<_>>());

    let stats = pool.stats();
    assert_eq!(stats.submitted_tasks, 10);
    assert_eq!(stats.completed_tasks, 10);
    assert_eq!(stats.active_tasks, 0);
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.worker_count, 3);
}

#[tokio::test]
async fn test_worker_count_bounds_concurrency() {
    let pool = WorkerPool::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
    pool.run_batch((0..12).collect::<Vec<u32>>(), 2, move |_| {
        let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        }
    })
    .await
    .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_admission() {
    let signal = ShutdownSignal::new();
    let pool = WorkerPool::new().with_shutdown(signal.clone());
    let trigger = signal.clone();

    let results = pool
        .run_batch((0..4u32).collect(), 1, move |n| {
            let trigger = trigger.clone();
            async move {
                if n == 0 {
                    trigger.trigger();
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                n
            }
        })
        .await
        .unwrap();

    assert_eq!(results, vec![Some(Ok(0)), None, None, None]);
}

#[tokio::test]
async fn test_panicking_item_is_contained() {
    let pool = WorkerPool::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);

    // One worker: a panic on the first item must not abandon the rest.
    let results = pool
        .run_batch(vec!["user0", "user1", "user2"], 1, move |id| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if id == "user0" {
                    panic!("session for {id} crashed");
                }
                id.len()
            }
        })
        .await
        .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert!(matches!(results[0], Some(Err(PoolError::TaskPanicked(_)))));
    assert_eq!(results[1], Some(Ok(5)));
    assert_eq!(results[2], Some(Ok(5)));
    let stats = pool.stats();
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.completed_tasks, 2);
    assert_eq!(stats.active_tasks, 0);
}

#[tokio::test]
async fn test_closed_pool_rejects_batches() {
    let pool = WorkerPool::new();
    pool.shutdown();
    assert!(pool.is_shutdown());
    let err = pool.run_batch(vec![1], 1, |n: i32| async move { n }).await.unwrap_err();
    assert_eq!(err, PoolError::PoolShutdown);
}

#[tokio::test]
async fn test_zero_workers_rejected() {
    let pool = WorkerPool::new();
    let err = pool.run_batch(vec![1], 0, |n: i32| async move { n }).await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_empty_batch_is_ok() {
    let pool = WorkerPool::new();
    let results = pool.run_batch(Vec::<u8>::new(), 4, |n| async move { n }).await.unwrap();
    assert!(results.is_empty());
}
