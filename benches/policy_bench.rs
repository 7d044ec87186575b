//! Benchmarks for the scheduling hot paths.
//!
//! Benchmarks cover:
//! - Load scoring and full policy derivation
//! - Failure classification over the rule table
//! - Retry plan and delay computation
//! - Worker pool batch dispatch

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use roster_scheduler::config::{RetryConfig, SchedulerConfig};
use roster_scheduler::core::{
    ErrorCategory, Failure, FailureClassifier, LoadPolicyEngine, MetricsSnapshot, RetryEngine, WorkerPool,
};
use roster_scheduler::util::FixedClock;

use tokio::runtime::Runtime;

// ============================================================================
// Load Policy Benchmarks
// ============================================================================

fn snapshot(load: f64) -> MetricsSnapshot {
    MetricsSnapshot {
        cpu_percent: load,
        memory_percent: load,
        disk_percent: load / 2.0,
        worker_memory_mb: load * 4.0,
        cpu_cores: 4,
        ..MetricsSnapshot::neutral()
    }
}

fn bench_load_score(c: &mut Criterion) {
    let engine = LoadPolicyEngine::new(SchedulerConfig::default(), Arc::new(FixedClock::new(14)));
    let samples: Vec<MetricsSnapshot> = (0..=10).map(|i| snapshot(f64::from(i) * 10.0)).collect();

    c.bench_function("load_score", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(engine.load_score(black_box(s)));
            }
        });
    });
}

fn bench_get_policy(c: &mut Criterion) {
    let engine = LoadPolicyEngine::new(SchedulerConfig::default(), Arc::new(FixedClock::new(14)));
    let mut group = c.benchmark_group("get_policy");

    for accounts in [1usize, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(accounts), &accounts, |b, &accounts| {
            let s = snapshot(55.0);
            b.iter(|| black_box(engine.get_policy(black_box(&s), accounts)));
        });
    }
    group.finish();
}

// ============================================================================
// Classification and Retry Benchmarks
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let classifier = FailureClassifier::new();
    let failures = [
        Failure::new("ConnectionError", "connection reset by peer"),
        Failure::new("TimeoutException", "page load exceeded 60s"),
        Failure::new("NoSuchElementException", "unable to locate #password"),
        Failure::new("Unknown", "something unexpected happened in the widget"),
    ];

    c.bench_function("classify", |b| {
        b.iter(|| {
            for f in &failures {
                black_box(classifier.classify(black_box(f)));
            }
        });
    });
}

fn bench_retry_plan(c: &mut Criterion) {
    let engine = RetryEngine::new(RetryConfig::default());

    c.bench_function("retry_plan_and_delay", |b| {
        b.iter(|| {
            for category in ErrorCategory::ALL {
                let plan = engine.plan(black_box(category));
                for retry in 0..plan.max_retries {
                    black_box(engine.retry_delay(&plan, retry, 0.5));
                }
            }
        });
    });
}

// ============================================================================
// Worker Pool Benchmarks
// ============================================================================

fn bench_pool_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_batch");

    for size in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let runtime = Runtime::new().unwrap();
            b.to_async(runtime).iter(|| async move {
                let pool = WorkerPool::new();
                let results = pool
                    .run_batch((0..size).collect(), 4, |n| async move { n * 2 })
                    .await
                    .unwrap();
                black_box(results);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_load_score,
    bench_get_policy,
    bench_classify,
    bench_retry_plan,
    bench_pool_batch
);
criterion_main!(benches);
