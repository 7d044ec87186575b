//! Scheduler configuration structures.
//!
//! Every section carries its own defaults, so a config file only needs the
//! values it wants to change. Durations are expressed in seconds (or
//! milliseconds where the field name says so) and converted on read.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ErrorCategory, LoadCategory, OperationKind, SchedulerError, TimeBucket};
use crate::util::clock::duration_from_secs as secs;

/// Memory thresholds in megabytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryThresholds {
    /// Worker memory considered "full pressure" on a regular host.
    pub default_mb: f64,
    /// Worker memory considered "full pressure" inside a container.
    pub cloud_mb: f64,
    /// Monitored memory that triggers a warning.
    pub warning_mb: f64,
    /// Monitored memory that is treated as critical.
    pub critical_mb: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            default_mb: 500.0,
            cloud_mb: 350.0,
            warning_mb: 750.0,
            critical_mb: 900.0,
        }
    }
}

/// Load-score weights and category breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Weight of CPU utilisation.
    pub cpu_weight: f64,
    /// Weight of memory utilisation.
    pub memory_weight: f64,
    /// Weight of disk utilisation.
    pub disk_weight: f64,
    /// Weight of worker-process memory pressure.
    pub worker_weight: f64,
    /// Scores at or above this are `Medium`.
    pub medium_threshold: f64,
    /// Scores at or above this are `High`.
    pub high_threshold: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            cpu_weight: 0.4,
            memory_weight: 0.3,
            disk_weight: 0.1,
            worker_weight: 0.2,
            medium_threshold: 40.0,
            high_threshold: 70.0,
        }
    }
}

/// Bounds on concurrently running account tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Lower bound, used under high load.
    pub min_processes: usize,
    /// Used under medium load.
    pub default_processes: usize,
    /// Upper bound, used under low load.
    pub max_processes: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            min_processes: 1,
            default_processes: 2,
            max_processes: 4,
        }
    }
}

/// Batch size bounds and per-category size factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Smallest batch the policy will produce (unless the roster is smaller).
    pub min_size: usize,
    /// Batch size at medium load.
    pub default_size: usize,
    /// Largest batch the policy will produce.
    pub max_size: usize,
    /// Multipliers applied to `default_size` per load category.
    pub size_factors: LoadFactors,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            default_size: 5,
            max_size: 10,
            size_factors: LoadFactors {
                low: 1.5,
                medium: 1.0,
                high: 0.6,
            },
        }
    }
}

/// Sleep interval bounds and scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Lower clamp for computed sleep intervals.
    pub min_interval_secs: f64,
    /// Base interval when the caller has none of its own.
    pub default_interval_secs: f64,
    /// Upper clamp for computed sleep intervals.
    pub max_interval_secs: f64,
    /// Symmetric random jitter as a fraction of the interval.
    pub jitter_factor: f64,
    /// Interval multipliers per load category.
    pub load_factors: LoadFactors,
    /// Interval multipliers per time-of-day bucket.
    pub time_factors: TimeFactors,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 5.0,
            default_interval_secs: 30.0,
            max_interval_secs: 300.0,
            jitter_factor: 0.2,
            load_factors: LoadFactors {
                low: 0.8,
                medium: 1.0,
                high: 1.5,
            },
            time_factors: TimeFactors::default(),
        }
    }
}

impl SleepConfig {
    /// Lower clamp as a duration.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        secs(self.min_interval_secs)
    }

    /// Upper clamp as a duration.
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        secs(self.max_interval_secs)
    }

    /// Default base interval as a duration.
    #[must_use]
    pub fn default_interval(&self) -> Duration {
        secs(self.default_interval_secs)
    }
}

/// A multiplier per load category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadFactors {
    /// Factor for [`LoadCategory::Low`].
    pub low: f64,
    /// Factor for [`LoadCategory::Medium`].
    pub medium: f64,
    /// Factor for [`LoadCategory::High`].
    pub high: f64,
}

impl LoadFactors {
    /// Factor for the given category.
    #[must_use]
    pub const fn for_category(&self, category: LoadCategory) -> f64 {
        match category {
            LoadCategory::Low => self.low,
            LoadCategory::Medium => self.medium,
            LoadCategory::High => self.high,
        }
    }

    fn all(&self) -> [f64; 3] {
        [self.low, self.medium, self.high]
    }
}

/// A multiplier per time-of-day bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeFactors {
    /// 05:00 to 12:00.
    pub morning: f64,
    /// 12:00 to 17:00.
    pub afternoon: f64,
    /// 17:00 to 22:00.
    pub evening: f64,
    /// 22:00 to 05:00.
    pub night: f64,
}

impl Default for TimeFactors {
    fn default() -> Self {
        Self {
            morning: 0.9,
            afternoon: 1.0,
            evening: 1.1,
            night: 1.2,
        }
    }
}

impl TimeFactors {
    /// Factor for the given bucket.
    #[must_use]
    pub const fn for_bucket(&self, bucket: TimeBucket) -> f64 {
        match bucket {
            TimeBucket::Morning => self.morning,
            TimeBucket::Afternoon => self.afternoon,
            TimeBucket::Evening => self.evening,
            TimeBucket::Night => self.night,
        }
    }
}

/// Base timeouts (seconds) per operation kind and their load scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connectivity checks.
    pub network_check_secs: f64,
    /// Page loads.
    pub page_load_secs: f64,
    /// Waiting for a page element.
    pub element_wait_secs: f64,
    /// Browser/driver start-up.
    pub driver_setup_secs: f64,
    /// One full account task attempt.
    pub process_secs: f64,
    /// One batch.
    pub batch_secs: f64,
    /// One cycle.
    pub cycle_secs: f64,
    /// Multipliers applied per load category.
    pub load_factors: LoadFactors,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            network_check_secs: 30.0,
            page_load_secs: 60.0,
            element_wait_secs: 30.0,
            driver_setup_secs: 60.0,
            process_secs: 300.0,
            batch_secs: 600.0,
            cycle_secs: 1800.0,
            load_factors: LoadFactors {
                low: 0.8,
                medium: 1.0,
                high: 1.5,
            },
        }
    }
}

impl TimeoutConfig {
    /// Unscaled base timeout for an operation kind.
    #[must_use]
    pub fn base(&self, operation: OperationKind) -> Duration {
        let value = match operation {
            OperationKind::NetworkCheck => self.network_check_secs,
            OperationKind::PageLoad => self.page_load_secs,
            OperationKind::ElementWait => self.element_wait_secs,
            OperationKind::DriverSetup => self.driver_setup_secs,
            OperationKind::Process => self.process_secs,
            OperationKind::Batch => self.batch_secs,
            OperationKind::Cycle => self.cycle_secs,
        };
        secs(value)
    }
}

/// Thresholds driving deferral and sequential execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Load score above which new batches are postponed.
    pub defer_threshold: f64,
    /// Load score above which concurrency drops to the minimum.
    pub sequential_threshold: f64,
    /// Rolling success rate below which deferral becomes more eager.
    pub success_rate_threshold: f64,
    /// Defer threshold reduction per unit of error rate (times 100).
    pub error_penalty: f64,
    /// Size of the rolling outcome window.
    pub metrics_window: usize,
    /// Seconds a metrics snapshot stays fresh.
    pub load_check_interval_secs: f64,
    /// Maximum number of deferral waits before a batch proceeds anyway.
    pub max_defer_rounds: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            defer_threshold: 80.0,
            sequential_threshold: 70.0,
            success_rate_threshold: 0.5,
            error_penalty: 0.1,
            metrics_window: 100,
            load_check_interval_secs: 30.0,
            max_defer_rounds: 10,
        }
    }
}

impl AdaptiveConfig {
    /// Snapshot freshness as a duration.
    #[must_use]
    pub fn load_check_interval(&self) -> Duration {
        secs(self.load_check_interval_secs)
    }
}

/// Load-aware backoff used while waiting out deferral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay in seconds.
    pub base_delay_secs: f64,
    /// Exponential growth factor per attempt.
    pub factor: f64,
    /// Extra growth for network failures.
    pub network_factor: f64,
    /// Extra growth for timeouts.
    pub timeout_factor: f64,
    /// Symmetric random jitter as a fraction of the delay.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 2.0,
            factor: 2.0,
            network_factor: 1.5,
            timeout_factor: 1.2,
            jitter_factor: 0.1,
        }
    }
}

/// Retry behaviour for one error category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_secs: f64,
    /// Double the delay on every retry.
    pub exponential_backoff: bool,
}

impl RetryPolicy {
    /// Construct a policy.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay_secs: f64, exponential_backoff: bool) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            exponential_backoff,
        }
    }

    /// Base delay as a duration.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        secs(self.base_delay_secs)
    }
}

/// Per-category retry table plus engine-wide limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Policy per error category.
    pub policies: HashMap<ErrorCategory, RetryPolicy>,
    /// Policy for categories missing from `policies`.
    pub default_policy: RetryPolicy,
    /// Upper bound on any computed retry delay, in seconds.
    pub max_delay_secs: f64,
    /// Same-category errors in the window above which retries are dampened.
    pub dampening_threshold: usize,
    /// Sliding window for dampening, in seconds.
    pub dampening_window_secs: f64,
    /// Capacity of the error history ring buffer.
    pub history_capacity: usize,
    /// Retry cap for the timeout category.
    pub timeout_max_retries: u32,
    /// Delay floor for the timeout category, in seconds.
    pub timeout_min_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policies = HashMap::from([
            (ErrorCategory::Network, RetryPolicy::new(3, 5.0, true)),
            (ErrorCategory::Browser, RetryPolicy::new(2, 3.0, true)),
            (ErrorCategory::Element, RetryPolicy::new(4, 2.0, true)),
            (ErrorCategory::Auth, RetryPolicy::new(3, 3.0, true)),
            (ErrorCategory::System, RetryPolicy::new(2, 10.0, true)),
            (ErrorCategory::Timeout, RetryPolicy::new(1, 10.0, false)),
            (ErrorCategory::Resource, RetryPolicy::new(2, 5.0, true)),
            (ErrorCategory::Permission, RetryPolicy::new(2, 5.0, true)),
            (ErrorCategory::Session, RetryPolicy::new(2, 5.0, true)),
            (ErrorCategory::Interaction, RetryPolicy::new(2, 5.0, true)),
            (ErrorCategory::Unknown, RetryPolicy::new(2, 5.0, true)),
        ]);
        Self {
            policies,
            default_policy: RetryPolicy::new(2, 5.0, true),
            max_delay_secs: 60.0,
            dampening_threshold: 5,
            dampening_window_secs: 600.0,
            history_capacity: 100,
            timeout_max_retries: 1,
            timeout_min_delay_secs: 5.0,
        }
    }
}

impl RetryConfig {
    /// Policy for a category, falling back to the default policy.
    #[must_use]
    pub fn policy_for(&self, category: ErrorCategory) -> RetryPolicy {
        self.policies
            .get(&category)
            .or_else(|| self.policies.get(&ErrorCategory::Unknown))
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Maximum retry delay as a duration.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        secs(self.max_delay_secs)
    }

    /// Dampening window as a duration.
    #[must_use]
    pub fn dampening_window(&self) -> Duration {
        secs(self.dampening_window_secs)
    }

    /// Timeout-category delay floor as a duration.
    #[must_use]
    pub fn timeout_min_delay(&self) -> Duration {
        secs(self.timeout_min_delay_secs)
    }
}

/// Delays between batches and cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Next-cycle delay after every account succeeded.
    pub success_delay_secs: f64,
    /// Next-cycle delay after a mix of successes and failures.
    pub partial_delay_secs: f64,
    /// Next-cycle delay after every account failed.
    pub failure_delay_secs: f64,
    /// Pause between batches when the previous batch had failures.
    pub inter_batch_delay_secs: f64,
    /// Pause after a cycle-level error.
    pub error_cooldown_secs: f64,
    /// Granularity of interruptible sleeps, in milliseconds.
    pub sleep_step_ms: u64,
    /// Stop after this many cycles; 0 runs indefinitely.
    pub max_cycles: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            success_delay_secs: 300.0,
            partial_delay_secs: 600.0,
            failure_delay_secs: 900.0,
            inter_batch_delay_secs: 30.0,
            error_cooldown_secs: 60.0,
            sleep_step_ms: 1000,
            max_cycles: 0,
        }
    }
}

impl CycleConfig {
    /// Inter-batch pause as a duration.
    #[must_use]
    pub fn inter_batch_delay(&self) -> Duration {
        secs(self.inter_batch_delay_secs)
    }

    /// Cooldown after a cycle-level error as a duration.
    #[must_use]
    pub fn error_cooldown(&self) -> Duration {
        secs(self.error_cooldown_secs)
    }

    /// Interruptible sleep step as a duration.
    #[must_use]
    pub const fn sleep_step(&self) -> Duration {
        Duration::from_millis(self.sleep_step_ms)
    }
}

/// Host sampling options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Case-insensitive substrings identifying worker processes by name.
    pub worker_process_patterns: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            worker_process_patterns: vec!["chrome".into(), "chromedriver".into()],
        }
    }
}

/// External program that performs the per-account session task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Program to execute once per account attempt.
    pub program: String,
    /// Arguments passed before nothing else; account data travels in env vars.
    pub args: Vec<String>,
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Load-score weights and breakpoints.
    pub score: ScoreConfig,
    /// Memory thresholds.
    pub memory_thresholds: MemoryThresholds,
    /// Concurrency bounds.
    pub concurrency: ConcurrencyConfig,
    /// Batch bounds.
    pub batch: BatchConfig,
    /// Sleep bounds.
    pub sleep: SleepConfig,
    /// Timeout table.
    pub timeouts: TimeoutConfig,
    /// Deferral and sequential thresholds.
    pub adaptive: AdaptiveConfig,
    /// Deferral backoff.
    pub backoff: BackoffConfig,
    /// Retry table.
    pub retry: RetryConfig,
    /// Batch and cycle delays.
    pub cycle: CycleConfig,
    /// Host sampling.
    pub monitor: MonitorConfig,
    /// Session program.
    pub session: SessionConfig,
}

impl SchedulerConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        let sc = &self.score;
        for (name, value) in [
            ("score.cpu_weight", sc.cpu_weight),
            ("score.memory_weight", sc.memory_weight),
            ("score.disk_weight", sc.disk_weight),
            ("score.worker_weight", sc.worker_weight),
        ] {
            non_negative(name, value)?;
        }
        score("score.medium_threshold", sc.medium_threshold)?;
        score("score.high_threshold", sc.high_threshold)?;
        if sc.medium_threshold > sc.high_threshold {
            return Err("score.medium_threshold must not exceed high_threshold".into());
        }

        let m = &self.memory_thresholds;
        for (name, value) in [
            ("memory_thresholds.default_mb", m.default_mb),
            ("memory_thresholds.cloud_mb", m.cloud_mb),
            ("memory_thresholds.warning_mb", m.warning_mb),
            ("memory_thresholds.critical_mb", m.critical_mb),
        ] {
            positive(name, value)?;
        }
        if m.warning_mb > m.critical_mb {
            return Err("memory_thresholds.warning_mb must not exceed critical_mb".into());
        }

        let c = &self.concurrency;
        if c.min_processes == 0 {
            return Err("concurrency.min_processes must be greater than 0".into());
        }
        if !(c.min_processes <= c.default_processes && c.default_processes <= c.max_processes) {
            return Err("concurrency must satisfy min <= default <= max".into());
        }

        let b = &self.batch;
        if b.min_size == 0 {
            return Err("batch.min_size must be greater than 0".into());
        }
        if !(b.min_size <= b.default_size && b.default_size <= b.max_size) {
            return Err("batch must satisfy min <= default <= max".into());
        }
        factors("batch.size_factors", &b.size_factors)?;

        let s = &self.sleep;
        positive("sleep.min_interval_secs", s.min_interval_secs)?;
        if !(s.min_interval_secs <= s.default_interval_secs
            && s.default_interval_secs <= s.max_interval_secs)
        {
            return Err("sleep must satisfy min <= default <= max".into());
        }
        fraction("sleep.jitter_factor", s.jitter_factor)?;
        factors("sleep.load_factors", &s.load_factors)?;
        let t = &s.time_factors;
        for value in [t.morning, t.afternoon, t.evening, t.night] {
            positive("sleep.time_factors", value)?;
        }

        for op in OperationKind::ALL {
            positive("timeouts", self.timeouts.base(op).as_secs_f64())?;
        }
        factors("timeouts.load_factors", &self.timeouts.load_factors)?;

        let a = &self.adaptive;
        score("adaptive.defer_threshold", a.defer_threshold)?;
        score("adaptive.sequential_threshold", a.sequential_threshold)?;
        if !(0.0..=1.0).contains(&a.success_rate_threshold) {
            return Err("adaptive.success_rate_threshold must be within [0, 1]".into());
        }
        if !a.error_penalty.is_finite() || a.error_penalty < 0.0 {
            return Err("adaptive.error_penalty must be non-negative".into());
        }
        if a.metrics_window == 0 {
            return Err("adaptive.metrics_window must be greater than 0".into());
        }
        positive("adaptive.load_check_interval_secs", a.load_check_interval_secs)?;

        let bo = &self.backoff;
        positive("backoff.base_delay_secs", bo.base_delay_secs)?;
        positive("backoff.factor", bo.factor)?;
        positive("backoff.network_factor", bo.network_factor)?;
        positive("backoff.timeout_factor", bo.timeout_factor)?;
        fraction("backoff.jitter_factor", bo.jitter_factor)?;

        let r = &self.retry;
        positive("retry.max_delay_secs", r.max_delay_secs)?;
        positive("retry.dampening_window_secs", r.dampening_window_secs)?;
        if r.history_capacity == 0 {
            return Err("retry.history_capacity must be greater than 0".into());
        }
        for (category, policy) in &r.policies {
            non_negative(&format!("retry.policies.{category}"), policy.base_delay_secs)?;
        }
        non_negative("retry.default_policy", r.default_policy.base_delay_secs)?;
        non_negative("retry.timeout_min_delay_secs", r.timeout_min_delay_secs)?;

        let cy = &self.cycle;
        for (name, value) in [
            ("cycle.success_delay_secs", cy.success_delay_secs),
            ("cycle.partial_delay_secs", cy.partial_delay_secs),
            ("cycle.failure_delay_secs", cy.failure_delay_secs),
            ("cycle.inter_batch_delay_secs", cy.inter_batch_delay_secs),
            ("cycle.error_cooldown_secs", cy.error_cooldown_secs),
        ] {
            non_negative(name, value)?;
        }
        if cy.sleep_step_ms == 0 {
            return Err("cycle.sleep_step_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON is malformed or validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when the file is unreadable or invalid.
    pub fn from_path(path: &Path) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content).map_err(SchedulerError::Config)
    }

    /// Return a copy with `patch` merged in. Objects merge key by key,
    /// everything else replaces. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error when the merged configuration is invalid.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, String> {
        let mut base = serde_json::to_value(self).map_err(|e| format!("encode error: {e}"))?;
        merge_json(&mut base, patch);
        let cfg: Self = serde_json::from_value(base).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key.clone()).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn positive(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be a positive number"))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be a non-negative number"))
    }
}

fn fraction(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within [0, 1)"))
    }
}

fn score(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within [0, 100]"))
    }
}

fn factors(name: &str, factors: &LoadFactors) -> Result<(), String> {
    factors.all().iter().try_for_each(|f| positive(name, *f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = SchedulerConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
    }

    #[test]
    fn policy_lookup_falls_back() {
        let mut retry = RetryConfig::default();
        retry.policies.remove(&ErrorCategory::Session);
        assert_eq!(
            retry.policy_for(ErrorCategory::Session),
            retry.policies[&ErrorCategory::Unknown]
        );
        retry.policies.clear();
        assert_eq!(retry.policy_for(ErrorCategory::Network), retry.default_policy);
    }

    #[test]
    fn merge_keeps_untouched_sections() {
        let cfg = SchedulerConfig::default();
        let patch = serde_json::json!({ "batch": { "default_size": 3 } });
        let merged = cfg.merged(&patch).unwrap();
        assert_eq!(merged.batch.default_size, 3);
        assert_eq!(merged.batch.max_size, cfg.batch.max_size);
        assert_eq!(merged.concurrency, cfg.concurrency);
    }

    #[test]
    fn merge_rejects_invalid_result() {
        let patch = serde_json::json!({ "concurrency": { "min_processes": 0 } });
        assert!(SchedulerConfig::default().merged(&patch).is_err());
    }
}
