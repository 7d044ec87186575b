//! Classified retry with backoff.
//!
//! One [`RetryEngine`] is shared by every caller. For each invocation it runs
//! the supplied operation, and on failure classifies it, records it in the
//! bounded error history and decides whether to retry:
//!
//! - The retry plan (budget and base delay) is fixed by the first failure's
//!   category policy.
//! - Timeouts get at most `timeout_max_retries` retries and a delay floor.
//! - When the same category failed more than `dampening_threshold` times in
//!   the dampening window, the delay doubles and the budget halves.
//! - A retry that fails more severely than the first attempt stops the loop.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::classify::{ErrorCategory, FailureClassifier, Severity};
use super::error::{Failure, RetryError};
use super::error_log::{ErrorLog, ErrorRecord, ErrorStatistics};
use crate::config::{RetryConfig, RetryPolicy};
use crate::runtime::shutdown::ShutdownSignal;
use crate::util::clock::duration_from_secs;

const STATISTICS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Retry budget and delay settled after the first failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPlan {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Double the delay on each retry.
    pub exponential: bool,
    /// Dampening was applied.
    pub dampened: bool,
}

/// Executes operations with classified, bounded retries.
#[derive(Debug)]
pub struct RetryEngine {
    classifier: FailureClassifier,
    config: RetryConfig,
    history: Mutex<ErrorLog>,
    counters: Mutex<BTreeMap<ErrorCategory, u64>>,
    shutdown: Option<ShutdownSignal>,
    sleep_step: Duration,
}

impl RetryEngine {
    /// Create an engine with the given retry table.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            classifier: FailureClassifier::new(),
            history: Mutex::new(ErrorLog::new(config.history_capacity)),
            counters: Mutex::new(BTreeMap::new()),
            config,
            shutdown: None,
            sleep_step: Duration::from_secs(1),
        }
    }

    /// Stop retrying once `signal` fires; inter-attempt sleeps wake every `step`.
    #[must_use]
    pub fn with_shutdown(mut self, signal: ShutdownSignal, step: Duration) -> Self {
        self.shutdown = Some(signal);
        self.sleep_step = step;
        self
    }

    /// The retry table in use.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or the retry plan is exhausted.
    ///
    /// `operation` receives the 1-based attempt number. When
    /// `attempt_timeout` is set each attempt runs under that deadline; an
    /// elapsed deadline drops the attempt's future and counts as a timeout
    /// failure. `category_hint` overrides classification for every attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError`] with the last failure when retries are
    /// exhausted, the failure escalated, or shutdown was requested.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        category_hint: Option<ErrorCategory>,
        attempt_timeout: Option<Duration>,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let mut attempt: u32 = 0;
        let mut first: Option<(Severity, RetryPlan)> = None;

        loop {
            attempt += 1;
            let result = match attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, operation(attempt))
                    .await
                    .unwrap_or_else(|_| Err(Failure::timeout(limit))),
                None => operation(attempt).await,
            };
            let failure = match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = operation_name, attempt, outcome = "recovered", "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let (category, severity) = self.categorize(&failure, category_hint);
            self.record(operation_name, &failure, category, severity);

            let (original, plan) = *first.get_or_insert_with(|| (severity, self.plan(category)));
            let give_up = |escalated: bool| RetryError {
                operation: operation_name.to_string(),
                failure: failure.clone(),
                category,
                severity,
                attempts: attempt,
                escalated,
            };

            if severity > original {
                warn!(
                    operation = operation_name,
                    %category,
                    %severity,
                    attempt,
                    outcome = "escalated",
                    "failure escalated; giving up"
                );
                return Err(give_up(true));
            }
            let retries_done = attempt - 1;
            if retries_done >= plan.max_retries {
                warn!(
                    operation = operation_name,
                    %category,
                    %severity,
                    attempt,
                    outcome = "exhausted",
                    error = %failure,
                    "retries exhausted"
                );
                return Err(give_up(false));
            }
            if self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
                info!(operation = operation_name, attempt, outcome = "cancelled", "shutdown; not retrying");
                return Err(give_up(false));
            }

            let delay = self.retry_delay(&plan, retries_done, rand::random::<f64>());
            warn!(
                operation = operation_name,
                %category,
                %severity,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "attempt failed; retrying"
            );
            let completed = match &self.shutdown {
                Some(signal) => signal.sleep(delay, self.sleep_step).await,
                None => {
                    tokio::time::sleep(delay).await;
                    true
                }
            };
            if !completed {
                info!(operation = operation_name, attempt, outcome = "cancelled", "shutdown during backoff");
                return Err(give_up(false));
            }
        }
    }

    /// Category and severity for a failure, honouring a hint.
    #[must_use]
    pub fn categorize(&self, failure: &Failure, hint: Option<ErrorCategory>) -> (ErrorCategory, Severity) {
        match hint {
            Some(category) => (category, FailureClassifier::default_severity(category)),
            None => self.classifier.classify(failure),
        }
    }

    /// Retry plan for a first failure of `category`, given the current history.
    #[must_use]
    pub fn plan(&self, category: ErrorCategory) -> RetryPlan {
        let policy: RetryPolicy = self.config.policy_for(category);
        let mut plan = RetryPlan {
            max_retries: policy.max_retries,
            base_delay: policy.base_delay(),
            exponential: policy.exponential_backoff,
            dampened: false,
        };
        if category == ErrorCategory::Timeout {
            plan.max_retries = plan.max_retries.min(self.config.timeout_max_retries);
            plan.base_delay = plan.base_delay.max(self.config.timeout_min_delay());
        }
        let recent = self
            .history
            .lock()
            .count_recent(category, self.config.dampening_window());
        if recent > self.config.dampening_threshold {
            debug!(%category, recent, "dampening retries for frequent failures");
            plan.base_delay = plan.base_delay.saturating_mul(2);
            plan.max_retries = (plan.max_retries / 2).max(1);
            plan.dampened = true;
        }
        plan
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// Exponential plans use `base * 2^retry + jitter`, with `jitter` in
    /// `[0, 1]` seconds; fixed plans use `base`. Both are capped at the
    /// configured maximum delay.
    #[must_use]
    pub fn retry_delay(&self, plan: &RetryPlan, retry: u32, jitter: f64) -> Duration {
        let base = plan.base_delay.as_secs_f64();
        let raw = if plan.exponential {
            let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
            base.mul_add(2f64.powi(exponent), jitter.clamp(0.0, 1.0))
        } else {
            base
        };
        let capped = raw.min(self.config.max_delay_secs);
        duration_from_secs(capped)
    }

    /// Per-category failure counts over the last 24 hours plus lifetime totals.
    #[must_use]
    pub fn error_statistics(&self) -> ErrorStatistics {
        let by_category = self.history.lock().counts_within(STATISTICS_WINDOW);
        let total = by_category.values().sum();
        ErrorStatistics {
            by_category,
            total,
            lifetime: self.counters.lock().clone(),
        }
    }

    /// Failures of `category` recorded within `window`.
    #[must_use]
    pub fn recent_errors(&self, category: ErrorCategory, window: Duration) -> usize {
        self.history.lock().count_recent(category, window)
    }

    /// Reset lifetime per-category counters.
    pub fn reset_counters(&self) {
        self.counters.lock().clear();
        info!("error counters reset");
    }

    /// Drop the error history.
    pub fn clear_history(&self) {
        self.history.lock().clear();
        info!("error history cleared");
    }

    fn record(&self, operation_name: &str, failure: &Failure, category: ErrorCategory, severity: Severity) {
        self.history
            .lock()
            .record(ErrorRecord::new(operation_name, failure, category, severity));
        *self.counters.lock().entry(category).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RetryEngine {
        RetryEngine::new(RetryConfig::default())
    }

    #[test]
    fn timeout_plan_is_capped() {
        let mut cfg = RetryConfig::default();
        cfg.policies
            .insert(ErrorCategory::Timeout, RetryPolicy::new(5, 1.0, true));
        let plan = RetryEngine::new(cfg).plan(ErrorCategory::Timeout);
        assert_eq!(plan.max_retries, 1);
        assert_eq!(plan.base_delay, Duration::from_secs(5));
    }

    #[test]
    fn dampening_after_threshold() {
        let e = engine();
        let f = Failure::new("ConnectionError", "refused");
        for _ in 0..6 {
            e.record("op", &f, ErrorCategory::Network, Severity::Medium);
        }
        let plan = e.plan(ErrorCategory::Network);
        assert!(plan.dampened);
        assert_eq!(plan.max_retries, 1);
        assert_eq!(plan.base_delay, Duration::from_secs(10));
        assert!(!e.plan(ErrorCategory::Auth).dampened);
    }

    #[test]
    fn delay_schedule() {
        let e = engine();
        let plan = RetryPlan {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            exponential: true,
            dampened: false,
        };
        assert_eq!(e.retry_delay(&plan, 0, 0.0), Duration::from_secs(2));
        assert_eq!(e.retry_delay(&plan, 2, 0.5), Duration::from_millis(8500));
        assert_eq!(e.retry_delay(&plan, 10, 0.0), Duration::from_secs(60));
        let fixed = RetryPlan { exponential: false, ..plan };
        assert_eq!(e.retry_delay(&fixed, 3, 0.9), Duration::from_secs(2));
    }

    #[test]
    fn hint_overrides_classification() {
        let e = engine();
        let f = Failure::new("ConnectionError", "refused");
        assert_eq!(
            e.categorize(&f, Some(ErrorCategory::Permission)),
            (ErrorCategory::Permission, Severity::Medium)
        );
        assert_eq!(e.categorize(&f, None).0, ErrorCategory::Network);
    }

    #[test]
    fn statistics_and_reset() {
        let e = engine();
        let f = Failure::new("OSError", "disk");
        e.record("op", &f, ErrorCategory::System, Severity::High);
        e.record("op", &f, ErrorCategory::System, Severity::High);
        let stats = e.error_statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.lifetime[&ErrorCategory::System], 2);
        e.reset_counters();
        e.clear_history();
        let stats = e.error_statistics();
        assert_eq!(stats.total, 0);
        assert!(stats.lifetime.is_empty());
    }
}
