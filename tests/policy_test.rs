//! Integration tests for the load policy engine
//!
//! These tests validate:
//! - Category breakpoints at the score thresholds
//! - Score bounds and monotonicity under rising load
//! - Batch size and concurrency bounds for every category
//! - Deferral under load, failures and memory pressure

use std::sync::Arc;
use std::time::Duration;

use roster_scheduler::config::SchedulerConfig;
use roster_scheduler::core::{LoadCategory, LoadPolicyEngine, MemoryPressure, MetricsSnapshot, OperationKind};
use roster_scheduler::util::FixedClock;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn engine_with(config: SchedulerConfig) -> LoadPolicyEngine {
    LoadPolicyEngine::new(config, Arc::new(FixedClock::new(14)))
}

fn engine() -> LoadPolicyEngine {
    engine_with(SchedulerConfig::default())
}

fn snapshot(cpu: f64, memory: f64, disk: f64, cores: usize) -> MetricsSnapshot {
    MetricsSnapshot {
        cpu_percent: cpu,
        memory_percent: memory,
        disk_percent: disk,
        cpu_cores: cores,
        ..MetricsSnapshot::neutral()
    }
}

// ============================================================================
// CATEGORY AND SCORE
// ============================================================================

#[test]
fn test_category_breakpoints() {
    assert_eq!(LoadCategory::from_score(0.0), LoadCategory::Low);
    assert_eq!(LoadCategory::from_score(39.99), LoadCategory::Low);
    assert_eq!(LoadCategory::from_score(40.0), LoadCategory::Medium);
    assert_eq!(LoadCategory::from_score(69.99), LoadCategory::Medium);
    assert_eq!(LoadCategory::from_score(70.0), LoadCategory::High);
    assert_eq!(LoadCategory::from_score(100.0), LoadCategory::High);
}

#[test]
fn test_score_is_bounded_and_monotonic() {
    let e = engine();
    let mut previous = -1.0;
    for step in 0..=20 {
        let v = f64::from(step) * 5.0;
        let score = e.load_score(&snapshot(v, v, v, 4));
        assert!((0.0..=100.0).contains(&score), "score {score} out of range");
        assert!(score >= previous, "score fell from {previous} to {score}");
        previous = score;
    }
}

#[test]
fn test_saturated_inputs_clamp_to_100() {
    let e = engine();
    let mut s = snapshot(250.0, 180.0, 400.0, 4);
    s.worker_memory_mb = 10_000.0;
    assert!((e.load_score(&s) - 100.0).abs() < 1e-9);
}

#[test]
fn test_invalid_metrics_fall_back_to_medium() {
    let e = engine();
    let s = snapshot(f64::NAN, 10.0, 10.0, 4);
    assert_eq!(e.get_category(&s), LoadCategory::Medium);
    let s = snapshot(-5.0, 10.0, 10.0, 4);
    assert_eq!(e.get_category(&s), LoadCategory::Medium);
}

#[test]
fn test_container_uses_cloud_worker_threshold() {
    let e = engine();
    let mut host = snapshot(0.0, 0.0, 0.0, 4);
    host.worker_memory_mb = 350.0;
    let mut container = host.clone();
    container.in_container = true;
    // 350 / 500 * 100 * 0.2 = 14; 350 / 350 * 100 * 0.2 = 20
    assert!((e.load_score(&host) - 14.0).abs() < 1e-9);
    assert!((e.load_score(&container) - 20.0).abs() < 1e-9);
}

// ============================================================================
// BATCH SIZE AND CONCURRENCY
// ============================================================================

#[test]
fn test_batch_size_never_exceeds_small_roster() {
    let e = engine();
    for category in [LoadCategory::Low, LoadCategory::Medium, LoadCategory::High] {
        let size = e.optimal_batch_size(category, 3);
        assert!((1..=3).contains(&size), "{category}: {size}");
    }
}

#[test]
fn test_batch_size_scales_with_category() {
    let e = engine();
    // default 5 * 1.5 / 1.0 / 0.6, clamped to [2, 10]
    assert_eq!(e.optimal_batch_size(LoadCategory::Low, 100), 7);
    assert_eq!(e.optimal_batch_size(LoadCategory::Medium, 100), 5);
    assert_eq!(e.optimal_batch_size(LoadCategory::High, 100), 3);
}

#[test]
fn test_single_account_roster_gets_batch_of_one() {
    let e = engine();
    assert_eq!(e.optimal_batch_size(LoadCategory::Low, 1), 1);
}

#[test]
fn test_concurrency_bounds_for_every_category() {
    let config = SchedulerConfig::default();
    let (min, max) = (config.concurrency.min_processes, config.concurrency.max_processes);
    let e = engine_with(config);
    for cores in [1, 2, 4, 16] {
        for category in [LoadCategory::Low, LoadCategory::Medium, LoadCategory::High] {
            let n = e.optimal_processes(category, cores);
            assert!(n >= min && n <= max, "{category} on {cores} cores: {n}");
            assert!(n <= cores.max(min), "{category} on {cores} cores: {n}");
        }
    }
}

#[test]
fn test_high_score_forces_sequential() {
    let e = engine();
    let policy = e.get_policy(&snapshot(100.0, 100.0, 50.0, 8), 20);
    assert!(policy.sequential);
    assert_eq!(policy.max_concurrency, 1);
    assert_eq!(policy.category, LoadCategory::High);
}

// ============================================================================
// INTERVALS AND TIMEOUTS
// ============================================================================

#[test]
fn test_sleep_interval_is_clamped() {
    let e = engine();
    let long = e.sleep_interval_with(Duration::from_secs(10_000), LoadCategory::High, 1.0);
    assert_eq!(long, Duration::from_secs(300));
    let short = e.sleep_interval_with(Duration::from_millis(100), LoadCategory::Low, -1.0);
    assert_eq!(short, Duration::from_secs(5));
}

#[test]
fn test_timeout_scales_with_load() {
    let e = engine();
    let low = e.adjusted_timeout(OperationKind::PageLoad, LoadCategory::Low);
    let high = e.adjusted_timeout(OperationKind::PageLoad, LoadCategory::High);
    assert!(high > low);
    assert!(e.adjusted_timeout(OperationKind::ElementWait, LoadCategory::Low) >= Duration::from_secs(1));
}

#[test]
fn test_backoff_grows_with_attempts() {
    let e = engine();
    let first = e.backoff_delay_with(0, None, 0.0);
    let third = e.backoff_delay_with(2, None, 0.0);
    assert_eq!(first, Duration::from_secs(2));
    assert_eq!(third, Duration::from_secs(8));
}

// ============================================================================
// DEFERRAL
// ============================================================================

#[test]
fn test_defer_above_threshold_only() {
    let e = engine();
    assert!(!e.should_defer(&snapshot(50.0, 50.0, 50.0, 4)));
    let mut heavy = snapshot(100.0, 100.0, 100.0, 4);
    heavy.worker_memory_mb = 500.0;
    assert!(e.should_defer(&heavy));
}

#[test]
fn test_adaptive_defer_lowers_threshold_on_failures() {
    let e = engine();
    // cpu 100, memory 100, disk 60 -> 76
    let s = snapshot(100.0, 100.0, 60.0, 4);
    assert!(!e.should_defer_adaptive(&s, 1.0, 0.0));
    assert!(e.should_defer_adaptive(&s, 0.2, 0.8));
}

#[test]
fn test_critical_memory_pressure_defers() {
    let e = engine();
    let mut s = snapshot(0.0, 0.0, 0.0, 4);
    s.worker_memory_mb = 950.0;
    assert_eq!(e.memory_pressure(&s), MemoryPressure::Critical);
    assert!(e.should_defer_adaptive(&s, 1.0, 0.0));
}

#[test]
fn test_set_config_rejects_invalid_patch() {
    let e = engine();
    let err = e
        .set_config(&serde_json::json!({ "score": { "medium_threshold": 90.0 } }))
        .unwrap_err();
    assert!(err.contains("medium_threshold"));
    assert!((e.config().score.medium_threshold - 40.0).abs() < f64::EPSILON);

    e.set_config(&serde_json::json!({ "score": { "medium_threshold": 30.0 } }))
        .unwrap();
    assert_eq!(e.get_category(&snapshot(50.0, 50.0, 0.0, 4)), LoadCategory::Medium);
}
