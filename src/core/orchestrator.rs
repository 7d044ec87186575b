//! Top-level batch control loop.
//!
//! One cycle walks the roster in batches:
//!
//! ```text
//! IDLE -> CYCLE_START -> BATCH_LOOP -> CYCLE_END -> SLEEP -> CYCLE_START ...
//! ```
//!
//! Batch size and concurrency come from the [`LoadPolicyEngine`]; every
//! account runs through the shared [`RetryEngine`], and every outcome feeds
//! the [`RollingOutcomeCounter`] that drives the next deferral decision.
//! Shutdown is observed at every state boundary and during every sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{AppResult, RetryError, SchedulerError};
use super::executor::{Account, RunMode, SessionExecutor, SessionOutcome};
use super::monitor::{MetricsCache, MetricsSnapshot};
use super::outcome::RollingOutcomeCounter;
use super::policy::{LoadCategory, LoadPolicyEngine, OperationKind};
use super::retry::RetryEngine;
use super::worker_pool::WorkerPool;
use crate::runtime::api::ServiceStatus;
use crate::runtime::shutdown::ShutdownSignal;

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Not started.
    Idle,
    /// Sampling load and computing the cycle policy.
    CycleStart,
    /// Dispatching batches.
    BatchLoop,
    /// Summarising the cycle.
    CycleEnd,
    /// Waiting for the next cycle.
    Sleep,
    /// Shut down.
    Stopped,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Position of the batch within its cycle.
    pub index: usize,
    /// Accounts whose session succeeded.
    pub completed: Vec<Account>,
    /// Accounts whose session failed after retries.
    pub failed: Vec<Account>,
    /// Accounts never started because shutdown was requested.
    pub skipped: Vec<Account>,
    /// Wall time spent on the batch.
    pub elapsed: Duration,
}

impl BatchResult {
    /// Accounts in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len()
    }

    /// True for a batch without accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// 1-based cycle number.
    pub cycle: u64,
    /// Per-batch results in dispatch order.
    pub batches: Vec<BatchResult>,
    /// Load category the cycle was planned with.
    pub category: LoadCategory,
    /// `completed / total` over the whole roster.
    pub success_rate: f64,
    /// Delay chosen before the next cycle.
    pub next_delay: Duration,
    /// Wall time spent on the cycle.
    pub elapsed: Duration,
    /// Shutdown cut the cycle short.
    pub interrupted: bool,
}

impl CycleResult {
    /// Accounts that succeeded.
    pub fn completed(&self) -> impl Iterator<Item = &Account> {
        self.batches.iter().flat_map(|b| b.completed.iter())
    }

    /// Accounts that failed.
    pub fn failed(&self) -> impl Iterator<Item = &Account> {
        self.batches.iter().flat_map(|b| b.failed.iter())
    }
}

/// Totals over a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Cycles completed.
    pub cycles: u64,
    /// Successful account sessions.
    pub completed: u64,
    /// Failed account sessions.
    pub failed: u64,
    /// Result of the last completed cycle.
    pub last_cycle: Option<CycleResult>,
}

/// Components wired together by the builder.
pub(crate) struct Components {
    pub policy: Arc<LoadPolicyEngine>,
    pub metrics: Arc<MetricsCache>,
    pub retry: Arc<RetryEngine>,
    pub executor: Arc<dyn SessionExecutor>,
    pub outcomes: Arc<RollingOutcomeCounter>,
    pub pool: WorkerPool,
    pub shutdown: ShutdownSignal,
    pub mode: RunMode,
}

/// Drives cycles of batches over the roster.
pub struct BatchOrchestrator {
    policy: Arc<LoadPolicyEngine>,
    metrics: Arc<MetricsCache>,
    retry: Arc<RetryEngine>,
    executor: Arc<dyn SessionExecutor>,
    outcomes: Arc<RollingOutcomeCounter>,
    pool: WorkerPool,
    shutdown: ShutdownSignal,
    mode: RunMode,
    state: Mutex<OrchestratorState>,
    cycles: AtomicU64,
    deferral_limit_hits: AtomicU64,
    started: Instant,
    run_id: Uuid,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("run_id", &self.run_id)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    pub(crate) fn new(parts: Components) -> Self {
        Self {
            policy: parts.policy,
            metrics: parts.metrics,
            retry: parts.retry,
            executor: parts.executor,
            outcomes: parts.outcomes,
            pool: parts.pool,
            shutdown: parts.shutdown,
            mode: parts.mode,
            state: Mutex::new(OrchestratorState::Idle),
            cycles: AtomicU64::new(0),
            deferral_limit_hits: AtomicU64::new(0),
            started: Instant::now(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Current control-loop state.
    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        *self.state.lock()
    }

    fn set_state(&self, next: OrchestratorState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "state transition");
        }
    }

    /// Shutdown signal shared with every component.
    #[must_use]
    pub const fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Load policy engine in use.
    #[must_use]
    pub const fn policy(&self) -> &Arc<LoadPolicyEngine> {
        &self.policy
    }

    /// Retry engine in use.
    #[must_use]
    pub const fn retry_engine(&self) -> &Arc<RetryEngine> {
        &self.retry
    }

    /// Rolling outcome counter.
    #[must_use]
    pub const fn outcomes(&self) -> &Arc<RollingOutcomeCounter> {
        &self.outcomes
    }

    /// Identifier of this orchestrator instance, attached to log events.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run cycles until shutdown or until `cycle.max_cycles` cycles completed.
    ///
    /// Cycle-level errors are logged and followed by the error cooldown; they
    /// never end the loop. The pool and executor are closed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error only when the roster is empty.
    pub async fn run(&self, roster: &[Account]) -> AppResult<RunSummary> {
        if roster.is_empty() {
            return Err(SchedulerError::Roster("roster is empty".into()).into());
        }
        let cfg = self.policy.config();
        let step = cfg.cycle.sleep_step();
        let mut summary = RunSummary::default();
        info!(
            run_id = %self.run_id,
            accounts = roster.len(),
            mode = self.mode.as_str(),
            max_cycles = cfg.cycle.max_cycles,
            "scheduler starting"
        );

        while !self.shutdown.is_triggered() {
            let cycle = self.cycles.load(Ordering::Relaxed) + 1;
            let delay = match self
                .run_cycle(roster)
                .instrument(info_span!("cycle", cycle, run_id = %self.run_id))
                .await
            {
                Ok(result) => {
                    summary.cycles += 1;
                    summary.completed += result.completed().count() as u64;
                    summary.failed += result.failed().count() as u64;
                    let delay = result.next_delay;
                    summary.last_cycle = Some(result);
                    if cfg.cycle.max_cycles > 0 && summary.cycles >= cfg.cycle.max_cycles {
                        info!(cycles = summary.cycles, "cycle limit reached");
                        break;
                    }
                    delay
                }
                Err(e) => {
                    error!(error = %e, cycle, "cycle failed; cooling down");
                    cfg.cycle.error_cooldown()
                }
            };
            if self.shutdown.is_triggered() {
                break;
            }
            self.set_state(OrchestratorState::Sleep);
            info!(delay_secs = delay.as_secs_f64(), "sleeping until next cycle");
            if !self.shutdown.sleep(delay, step).await {
                break;
            }
        }

        self.close().await;
        info!(
            cycles = summary.cycles,
            completed = summary.completed,
            failed = summary.failed,
            "scheduler stopped"
        );
        Ok(summary)
    }

    /// Run one full cycle over `roster`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Pool` when the worker pool rejects a batch.
    #[allow(clippy::cast_precision_loss)]
    pub async fn run_cycle(&self, roster: &[Account]) -> Result<CycleResult, SchedulerError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        self.set_state(OrchestratorState::CycleStart);

        let snapshot = self.defer_while_loaded().await;
        let policy = self.policy.get_policy(&snapshot, roster.len());
        info!(
            load_score = policy.load_score,
            category = %policy.category,
            batch_size = policy.batch_size,
            concurrency = policy.max_concurrency,
            sequential = policy.sequential,
            memory_pressure = ?policy.memory_pressure,
            "cycle started"
        );

        self.set_state(OrchestratorState::BatchLoop);
        let chunks: Vec<&[Account]> = roster.chunks(policy.batch_size.max(1)).collect();
        let mut batches = Vec::with_capacity(chunks.len());
        let mut interrupted = false;
        let mut concurrency = policy.max_concurrency;

        for (index, chunk) in chunks.iter().enumerate() {
            if self.shutdown.is_triggered() {
                interrupted = true;
                batches.push(BatchResult {
                    index,
                    skipped: chunk.to_vec(),
                    ..BatchResult::default()
                });
                continue;
            }
            if index > 0 {
                let fresh = self.defer_while_loaded().await;
                concurrency = self.policy.get_policy(&fresh, roster.len()).max_concurrency;
            }
            let result = self
                .run_batch_of(index, chunk, concurrency, policy.category)
                .await?;
            let had_failures = !result.failed.is_empty();
            batches.push(result);

            if had_failures && index + 1 < chunks.len() {
                let pause = self.policy.config().cycle.inter_batch_delay();
                info!(pause_secs = pause.as_secs_f64(), "batch had failures; pausing");
                let step = self.policy.config().cycle.sleep_step();
                if !self.shutdown.sleep(pause, step).await {
                    interrupted = true;
                }
            }
        }

        self.set_state(OrchestratorState::CycleEnd);
        let completed: usize = batches.iter().map(|b| b.completed.len()).sum();
        let failed: usize = batches.iter().map(|b| b.failed.len()).sum();
        let total = roster.len();
        let success_rate = if total == 0 { 1.0 } else { completed as f64 / total as f64 };
        let next_delay = self.next_cycle_delay(completed, total, policy.category);
        let elapsed = started.elapsed();
        info!(
            completed,
            failed,
            total,
            success_rate,
            elapsed_secs = elapsed.as_secs_f64(),
            next_delay_secs = next_delay.as_secs_f64(),
            interrupted,
            "cycle finished"
        );

        Ok(CycleResult {
            cycle,
            batches,
            category: policy.category,
            success_rate,
            next_delay,
            elapsed,
            interrupted,
        })
    }

    /// Run one batch of accounts with at most `concurrency` sessions at once.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Pool` when the worker pool rejects the batch.
    pub async fn run_batch_of(
        &self,
        index: usize,
        accounts: &[Account],
        concurrency: usize,
        category: LoadCategory,
    ) -> Result<BatchResult, SchedulerError> {
        let started = Instant::now();
        let timeout = self.policy.adjusted_timeout(OperationKind::Process, category);
        info!(batch = index, size = accounts.len(), concurrency, "batch started");

        let retry = Arc::clone(&self.retry);
        let executor = Arc::clone(&self.executor);
        let outcomes = Arc::clone(&self.outcomes);
        let mode = self.mode;
        let results = self
            .pool
            .run_batch(accounts.to_vec(), concurrency, move |account: Account| {
                let retry = Arc::clone(&retry);
                let executor = Arc::clone(&executor);
                let outcomes = Arc::clone(&outcomes);
                let span = info_span!("account", account_id = %account.identifier);
                async move {
                    let result = run_account(&retry, executor.as_ref(), &account, mode, timeout).await;
                    match &result {
                        Ok(_) => outcomes.report_success(),
                        Err(_) => outcomes.report_error(),
                    }
                    result
                }
                .instrument(span)
            })
            .await
            .map_err(|e| SchedulerError::Pool(e.to_string()))?;

        let mut batch = BatchResult {
            index,
            ..BatchResult::default()
        };
        for (account, result) in accounts.iter().cloned().zip(results) {
            match result {
                Some(Ok(Ok(_))) => batch.completed.push(account),
                Some(Ok(Err(_))) => batch.failed.push(account),
                Some(Err(e)) => {
                    error!(account_id = %account.identifier, error = %e, "session task panicked");
                    self.outcomes.report_error();
                    batch.failed.push(account);
                }
                None if self.shutdown.is_triggered() => batch.skipped.push(account),
                None => {
                    self.outcomes.report_error();
                    batch.failed.push(account);
                }
            }
        }
        batch.elapsed = started.elapsed();
        info!(
            batch = index,
            completed = batch.completed.len(),
            failed = batch.failed.len(),
            skipped = batch.skipped.len(),
            elapsed_secs = batch.elapsed.as_secs_f64(),
            "batch finished"
        );
        Ok(batch)
    }

    /// Delay before the next cycle: the success, partial or failure bucket
    /// scaled by load, time of day and jitter.
    #[must_use]
    pub fn next_cycle_delay(&self, completed: usize, total: usize, category: LoadCategory) -> Duration {
        let cycle = self.policy.config().cycle;
        let bucket = if completed >= total {
            cycle.success_delay_secs
        } else if completed == 0 {
            cycle.failure_delay_secs
        } else {
            cycle.partial_delay_secs
        };
        self.policy
            .scale_interval(crate::util::clock::duration_from_secs(bucket), category)
    }

    /// Run the session for a single account once, with retries.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`RetryError`] when every attempt failed.
    pub async fn run_single(&self, account: &Account) -> Result<SessionOutcome, RetryError> {
        let snapshot = self.metrics.snapshot();
        let category = self.policy.get_category(&snapshot);
        let timeout = self.policy.adjusted_timeout(OperationKind::Process, category);
        let span = info_span!("account", account_id = %account.identifier, run_id = %self.run_id);
        let result = run_account(&self.retry, self.executor.as_ref(), account, self.mode, timeout)
            .instrument(span)
            .await;
        match &result {
            Ok(_) => self.outcomes.report_success(),
            Err(_) => self.outcomes.report_error(),
        }
        result
    }

    /// Wait while load (and recent failures) say new work should be postponed.
    ///
    /// Each round waits the policy backoff delay, capped at the maximum
    /// sleep interval, and resamples. After `max_defer_rounds` rounds the
    /// caller proceeds regardless; the limit only counts as reached when the
    /// last sample still says to defer.
    async fn defer_while_loaded(&self) -> MetricsSnapshot {
        let cfg = self.policy.config();
        let step = cfg.cycle.sleep_step();
        let mut snapshot = self.metrics.snapshot();
        for round in 0..cfg.adaptive.max_defer_rounds {
            let outcomes = self.outcomes.snapshot();
            if !self
                .policy
                .should_defer_adaptive(&snapshot, outcomes.success_rate, outcomes.error_rate)
            {
                return snapshot;
            }
            let delay = self.policy.backoff_delay(round, None).min(cfg.sleep.max_interval());
            warn!(
                round,
                load_score = self.policy.load_score(&snapshot),
                success_rate = outcomes.success_rate,
                delay_secs = delay.as_secs_f64(),
                "system under load; deferring"
            );
            if !self.shutdown.sleep(delay, step).await {
                return snapshot;
            }
            snapshot = self.metrics.refresh();
        }
        let outcomes = self.outcomes.snapshot();
        if cfg.adaptive.max_defer_rounds > 0
            && self
                .policy
                .should_defer_adaptive(&snapshot, outcomes.success_rate, outcomes.error_rate)
        {
            self.deferral_limit_hits.fetch_add(1, Ordering::Relaxed);
            warn!(rounds = cfg.adaptive.max_defer_rounds, "deferral limit reached; proceeding");
        }
        snapshot
    }

    /// Operator-facing snapshot of the service.
    #[must_use]
    pub fn status(&self, account_count: usize) -> ServiceStatus {
        let snapshot = self.metrics.snapshot();
        let policy = self.policy.get_policy(&snapshot, account_count.max(1));
        ServiceStatus {
            run_id: self.run_id.to_string(),
            state: self.state(),
            mode: self.mode,
            uptime_secs: self.started.elapsed().as_secs(),
            cycles_started: self.cycles.load(Ordering::Relaxed),
            deferral_limit_hits: self.deferral_limit_hits.load(Ordering::Relaxed),
            load_score: policy.load_score,
            category: policy.category,
            time_bucket: policy.time_bucket,
            memory_pressure: policy.memory_pressure,
            optimal_concurrency: policy.max_concurrency,
            batch_size: policy.batch_size,
            defer: policy.defer,
            outcomes: self.outcomes.snapshot(),
            errors: self.retry.error_statistics(),
            pool: self.pool.stats(),
            metrics: snapshot,
            shutting_down: self.shutdown.is_triggered(),
        }
    }

    /// Close the pool and the executor.
    pub async fn close(&self) {
        self.pool.shutdown();
        self.executor.close().await;
        self.set_state(OrchestratorState::Stopped);
    }
}

async fn run_account(
    retry: &RetryEngine,
    executor: &dyn SessionExecutor,
    account: &Account,
    mode: RunMode,
    timeout: Duration,
) -> Result<SessionOutcome, RetryError> {
    let operation = format!("session:{}", account.identifier);
    let result = retry
        .execute_with_retry(&operation, None, Some(timeout), |attempt| {
            debug!(attempt, "session attempt");
            executor.run(account, mode)
        })
        .await;
    match &result {
        Ok(outcome) => info!(
            outcome = "success",
            enabled = outcome.enabled,
            changed = outcome.changed,
            "session finished"
        ),
        Err(e) => warn!(
            outcome = "failed",
            category = %e.category,
            severity = %e.severity,
            attempts = e.attempts,
            "session failed"
        ),
    }
    result
}
