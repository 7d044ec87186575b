//! Load policy engine.
//!
//! Turns a [`MetricsSnapshot`] into a load score in `[0, 100]`, a discrete
//! [`LoadCategory`] and the operational parameters derived from it:
//! concurrency, batch size, sleep intervals, timeouts and backoff.
//!
//! The engine holds only its configuration (behind a read-write lock) and a
//! clock. Every decision is recomputed from the snapshot it is given, so the
//! engine itself never samples the host.
//!
//! Malformed input (non-finite or negative figures) never raises: the score
//! falls back to the middle of the `Medium` band and a warning is logged.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use super::classify::ErrorCategory;
use super::monitor::MetricsSnapshot;
use crate::config::SchedulerConfig;
use crate::util::clock::{duration_from_secs, Clock};

/// Discretised load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCategory {
    /// Spare capacity.
    Low,
    /// Normal operation.
    Medium,
    /// Busy host.
    High,
}

impl LoadCategory {
    /// Category for `score` using the default 40/70 breakpoints.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        Self::with_thresholds(score, 40.0, 70.0)
    }

    /// Category for `score` with explicit breakpoints.
    #[must_use]
    pub fn with_thresholds(score: f64, medium: f64, high: f64) -> Self {
        if score < medium {
            Self::Low
        } else if score < high {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl std::fmt::Display for LoadCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Time-of-day bucket used to stretch or shrink sleep intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// 05:00 to 12:00.
    Morning,
    /// 12:00 to 17:00.
    Afternoon,
    /// 17:00 to 22:00.
    Evening,
    /// 22:00 to 05:00.
    Night,
}

impl TimeBucket {
    /// Bucket for a local hour.
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=21 => Self::Evening,
            _ => Self::Night,
        }
    }
}

/// Operations with their own base timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Connectivity check.
    NetworkCheck,
    /// Page load.
    PageLoad,
    /// Element wait.
    ElementWait,
    /// Browser/driver start-up.
    DriverSetup,
    /// One account task attempt.
    Process,
    /// One batch.
    Batch,
    /// One cycle.
    Cycle,
}

impl OperationKind {
    /// Every operation kind.
    pub const ALL: [Self; 7] = [
        Self::NetworkCheck,
        Self::PageLoad,
        Self::ElementWait,
        Self::DriverSetup,
        Self::Process,
        Self::Batch,
        Self::Cycle,
    ];

    /// Operation-specific timeout multiplier.
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::PageLoad => 1.1,
            Self::ElementWait => 0.9,
            Self::DriverSetup => 1.2,
            _ => 1.0,
        }
    }
}

/// Memory used by the scheduler and its workers relative to thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    /// Below the base threshold.
    Normal,
    /// Above the base (default or cloud) threshold.
    AboveThreshold,
    /// At or above the warning threshold.
    Warning,
    /// At or above the critical threshold.
    Critical,
}

/// Operational parameters for one decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationalPolicy {
    /// Load score the policy was derived from.
    pub load_score: f64,
    /// Category of `load_score`.
    pub category: LoadCategory,
    /// Time-of-day bucket.
    pub time_bucket: TimeBucket,
    /// Accounts processed concurrently.
    pub max_concurrency: usize,
    /// Accounts per batch.
    pub batch_size: usize,
    /// Default sleep interval scaled by load and time of day.
    pub sleep_interval: Duration,
    /// Timeout multiplier for the current load.
    pub timeout_scale: f64,
    /// First deferral backoff delay.
    pub backoff_base: Duration,
    /// Load is high enough to run one account at a time.
    pub sequential: bool,
    /// Load is high enough to postpone new work.
    pub defer: bool,
    /// Memory pressure level.
    pub memory_pressure: MemoryPressure,
}

/// Converts metrics into operational decisions.
pub struct LoadPolicyEngine {
    config: RwLock<SchedulerConfig>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LoadPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPolicyEngine").finish_non_exhaustive()
    }
}

impl LoadPolicyEngine {
    /// Create an engine from a validated configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: RwLock::new(config),
            clock,
        }
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.config.read().clone()
    }

    /// Merge a partial JSON configuration into the current one.
    ///
    /// The merged result is validated first; on error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns the validation message when the merged configuration is invalid.
    pub fn set_config(&self, patch: &serde_json::Value) -> Result<(), String> {
        let mut guard = self.config.write();
        let next = guard.merged(patch)?;
        *guard = next;
        info!(patch = %patch, "load policy configuration updated");
        Ok(())
    }

    /// Current time-of-day bucket.
    #[must_use]
    pub fn time_bucket(&self) -> TimeBucket {
        TimeBucket::from_hour(self.clock.local_hour())
    }

    /// Weighted load score in `[0, 100]`.
    #[must_use]
    pub fn load_score(&self, snapshot: &MetricsSnapshot) -> f64 {
        score(&self.config.read(), snapshot)
    }

    /// Load category of a snapshot.
    #[must_use]
    pub fn get_category(&self, snapshot: &MetricsSnapshot) -> LoadCategory {
        let cfg = self.config.read();
        category(&cfg, score(&cfg, snapshot))
    }

    /// Full policy for a roster of `account_count` accounts.
    #[must_use]
    pub fn get_policy(&self, snapshot: &MetricsSnapshot, account_count: usize) -> OperationalPolicy {
        let cfg = self.config.read();
        let load_score = score(&cfg, snapshot);
        let category = category(&cfg, load_score);
        let time_bucket = self.time_bucket();
        let sequential = load_score > cfg.adaptive.sequential_threshold;
        let max_concurrency = if sequential {
            cfg.concurrency.min_processes
        } else {
            processes(&cfg, category, snapshot.cpu_cores)
        };
        let memory_pressure = pressure(&cfg, snapshot);
        OperationalPolicy {
            load_score,
            category,
            time_bucket,
            max_concurrency,
            batch_size: batch_size(&cfg, category, account_count),
            sleep_interval: interval(
                &cfg,
                cfg.sleep.default_interval(),
                category,
                time_bucket,
                jitter_unit(),
                true,
            ),
            timeout_scale: cfg.timeouts.load_factors.for_category(category),
            backoff_base: backoff(&cfg, 0, None, 0.0),
            sequential,
            defer: load_score > cfg.adaptive.defer_threshold || memory_pressure == MemoryPressure::Critical,
            memory_pressure,
        }
    }

    /// Concurrency for a category on a host with `cpu_cores` cores.
    #[must_use]
    pub fn optimal_processes(&self, category: LoadCategory, cpu_cores: usize) -> usize {
        processes(&self.config.read(), category, cpu_cores)
    }

    /// Batch size for a category and roster size.
    #[must_use]
    pub fn optimal_batch_size(&self, category: LoadCategory, account_count: usize) -> usize {
        batch_size(&self.config.read(), category, account_count)
    }

    /// `base` scaled by load, time of day and jitter, clamped to the sleep bounds.
    #[must_use]
    pub fn sleep_interval(&self, base: Duration, category: LoadCategory) -> Duration {
        self.sleep_interval_with(base, category, jitter_unit())
    }

    /// [`Self::sleep_interval`] with an explicit jitter sample in `[-1, 1]`.
    #[must_use]
    pub fn sleep_interval_with(&self, base: Duration, category: LoadCategory, jitter: f64) -> Duration {
        interval(&self.config.read(), base, category, self.time_bucket(), jitter, true)
    }

    /// `base` scaled by load, time of day and jitter without clamping.
    /// Used for cycle delays, which are longer than the sleep bounds.
    #[must_use]
    pub fn scale_interval(&self, base: Duration, category: LoadCategory) -> Duration {
        self.scale_interval_with(base, category, jitter_unit())
    }

    /// [`Self::scale_interval`] with an explicit jitter sample in `[-1, 1]`.
    #[must_use]
    pub fn scale_interval_with(&self, base: Duration, category: LoadCategory, jitter: f64) -> Duration {
        interval(&self.config.read(), base, category, self.time_bucket(), jitter, false)
    }

    /// Base timeout for `operation` scaled by load. Never below one second.
    #[must_use]
    pub fn adjusted_timeout(&self, operation: OperationKind, category: LoadCategory) -> Duration {
        let cfg = self.config.read();
        let base = cfg.timeouts.base(operation).as_secs_f64();
        let scaled = base * cfg.timeouts.load_factors.for_category(category) * operation.factor();
        duration_from_secs(scaled.max(1.0))
    }

    /// Load-aware backoff for the given attempt (0-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, category: Option<ErrorCategory>) -> Duration {
        backoff(&self.config.read(), attempt, category, jitter_unit())
    }

    /// [`Self::backoff_delay`] with an explicit jitter sample in `[-1, 1]`.
    #[must_use]
    pub fn backoff_delay_with(&self, attempt: u32, category: Option<ErrorCategory>, jitter: f64) -> Duration {
        backoff(&self.config.read(), attempt, category, jitter)
    }

    /// True when the score exceeds the defer threshold.
    #[must_use]
    pub fn should_defer(&self, snapshot: &MetricsSnapshot) -> bool {
        let cfg = self.config.read();
        score(&cfg, snapshot) > cfg.adaptive.defer_threshold
    }

    /// Deferral that also reacts to recent outcomes and memory pressure.
    ///
    /// When the success rate is below the configured threshold, the defer
    /// threshold is lowered in proportion to the error rate.
    #[must_use]
    pub fn should_defer_adaptive(&self, snapshot: &MetricsSnapshot, success_rate: f64, error_rate: f64) -> bool {
        let cfg = self.config.read();
        let adaptive = &cfg.adaptive;
        let mut threshold = adaptive.defer_threshold;
        if success_rate < adaptive.success_rate_threshold {
            threshold -= adaptive.error_penalty * 100.0 * error_rate.clamp(0.0, 1.0);
        }
        score(&cfg, snapshot) > threshold || pressure(&cfg, snapshot) == MemoryPressure::Critical
    }

    /// Memory pressure of the scheduler and its workers.
    #[must_use]
    pub fn memory_pressure(&self, snapshot: &MetricsSnapshot) -> MemoryPressure {
        pressure(&self.config.read(), snapshot)
    }
}

const FALLBACK_SCORE: f64 = 55.0;

fn inputs_valid(s: &MetricsSnapshot) -> bool {
    [
        s.cpu_percent,
        s.normalized_load,
        s.memory_percent,
        s.disk_percent,
        s.worker_memory_mb,
    ]
    .iter()
    .all(|v| v.is_finite() && *v >= 0.0)
}

fn score(cfg: &SchedulerConfig, s: &MetricsSnapshot) -> f64 {
    if !inputs_valid(s) {
        warn!(
            cpu = s.cpu_percent,
            memory = s.memory_percent,
            disk = s.disk_percent,
            "invalid metrics; falling back to medium load"
        );
        return FALLBACK_SCORE;
    }
    let w = &cfg.score;
    let cpu = s.cpu_percent.max(s.normalized_load).min(100.0);
    let memory = s.memory_percent.min(100.0);
    let disk = s.disk_percent.min(100.0);
    let value = w.cpu_weight * cpu
        + w.memory_weight * memory
        + w.disk_weight * disk
        + w.worker_weight * worker_pressure(cfg, s);
    value.clamp(0.0, 100.0)
}

fn worker_pressure(cfg: &SchedulerConfig, s: &MetricsSnapshot) -> f64 {
    let threshold = if s.in_container {
        cfg.memory_thresholds.cloud_mb
    } else {
        cfg.memory_thresholds.default_mb
    };
    if threshold <= 0.0 {
        return 0.0;
    }
    (s.worker_memory_mb / threshold * 100.0).min(100.0)
}

fn category(cfg: &SchedulerConfig, score: f64) -> LoadCategory {
    LoadCategory::with_thresholds(score, cfg.score.medium_threshold, cfg.score.high_threshold)
}

fn processes(cfg: &SchedulerConfig, category: LoadCategory, cpu_cores: usize) -> usize {
    let c = &cfg.concurrency;
    let target = match category {
        LoadCategory::Low => c.max_processes,
        LoadCategory::Medium => c.default_processes,
        LoadCategory::High => c.min_processes,
    };
    target.min(c.max_processes.min(cpu_cores.max(1))).max(c.min_processes)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn batch_size(cfg: &SchedulerConfig, category: LoadCategory, account_count: usize) -> usize {
    let b = &cfg.batch;
    let raw = (b.default_size as f64 * b.size_factors.for_category(category)).trunc().max(0.0) as usize;
    raw.clamp(b.min_size, b.max_size).min(account_count).max(1)
}

fn interval(
    cfg: &SchedulerConfig,
    base: Duration,
    category: LoadCategory,
    bucket: TimeBucket,
    jitter: f64,
    clamp: bool,
) -> Duration {
    let s = &cfg.sleep;
    let jitter = 1.0 + s.jitter_factor * jitter.clamp(-1.0, 1.0);
    let value = base.as_secs_f64() * s.load_factors.for_category(category) * s.time_factors.for_bucket(bucket) * jitter;
    if clamp {
        duration_from_secs(value.clamp(s.min_interval_secs, s.max_interval_secs))
    } else {
        duration_from_secs(value)
    }
}

fn backoff(cfg: &SchedulerConfig, attempt: u32, category: Option<ErrorCategory>, jitter: f64) -> Duration {
    let b = &cfg.backoff;
    let category_factor = match category {
        Some(ErrorCategory::Network) => b.network_factor,
        Some(ErrorCategory::Timeout) => b.timeout_factor,
        _ => 1.0,
    };
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay = b.base_delay_secs * (b.factor * category_factor).powi(exponent);
    let delay = delay * (1.0 + b.jitter_factor * jitter.clamp(-1.0, 1.0));
    duration_from_secs(delay.max(1.0))
}

fn pressure(cfg: &SchedulerConfig, s: &MetricsSnapshot) -> MemoryPressure {
    let m = &cfg.memory_thresholds;
    let used = s.monitored_memory_mb();
    let base = if s.in_container { m.cloud_mb } else { m.default_mb };
    if used >= m.critical_mb {
        MemoryPressure::Critical
    } else if used >= m.warning_mb {
        MemoryPressure::Warning
    } else if used > base {
        MemoryPressure::AboveThreshold
    } else {
        MemoryPressure::Normal
    }
}

fn jitter_unit() -> f64 {
    rand::random_range(-1.0..=1.0)
}
