//! Builder wiring a [`BatchOrchestrator`] from configuration.
//!
//! Every collaborator can be injected; anything left unset gets the
//! production default (host metrics, local clock, process-backed executor).

use std::sync::Arc;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::orchestrator::Components;
use crate::core::{
    BatchOrchestrator, LoadPolicyEngine, MetricsCache, MetricsSource, RetryEngine,
    RollingOutcomeCounter, RunMode, SchedulerError, SessionExecutor, SystemMonitor, WorkerPool,
};
use crate::infra::CommandSessionExecutor;
use crate::runtime::ShutdownSignal;
use crate::util::clock::{Clock, SystemClock};

/// Assembles a [`BatchOrchestrator`].
pub struct OrchestratorBuilder {
    config: SchedulerConfig,
    executor: Option<Arc<dyn SessionExecutor>>,
    metrics: Option<Arc<dyn MetricsSource>>,
    clock: Option<Arc<dyn Clock>>,
    shutdown: Option<ShutdownSignal>,
    mode: RunMode,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("mode", &self.mode)
            .field("executor", &self.executor.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            executor: None,
            metrics: None,
            clock: None,
            shutdown: None,
            mode: RunMode::Toggle,
        }
    }

    /// Configuration the orchestrator will be built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Use `executor` instead of the configured session program.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn SessionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sample metrics from `source` instead of the host.
    #[must_use]
    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// Read the time of day from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing shutdown signal.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Session run mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate the configuration and wire every component.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` when validation fails or no session
    /// executor is available.
    pub fn build(self) -> Result<BatchOrchestrator, SchedulerError> {
        let cfg = self.config;
        cfg.validate()
            .map_err(|e| SchedulerError::Config(format!("config invalid: {e}")))?;

        let executor: Arc<dyn SessionExecutor> = match self.executor {
            Some(executor) => executor,
            None if !cfg.session.program.trim().is_empty() => {
                Arc::new(CommandSessionExecutor::new(&cfg.session))
            }
            None => {
                return Err(SchedulerError::Config(
                    "no session executor: set session.program".into(),
                ))
            }
        };
        let source = self.metrics.unwrap_or_else(|| {
            Arc::new(SystemMonitor::new(&cfg.monitor.worker_process_patterns)) as Arc<dyn MetricsSource>
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let shutdown = self.shutdown.unwrap_or_default();

        let metrics = Arc::new(MetricsCache::new(source, cfg.adaptive.load_check_interval()));
        let retry = Arc::new(
            RetryEngine::new(cfg.retry.clone()).with_shutdown(shutdown.clone(), cfg.cycle.sleep_step()),
        );
        let outcomes = Arc::new(RollingOutcomeCounter::new(cfg.adaptive.metrics_window));
        let pool = WorkerPool::new().with_shutdown(shutdown.clone());

        info!(
            mode = self.mode.as_str(),
            min_processes = cfg.concurrency.min_processes,
            max_processes = cfg.concurrency.max_processes,
            batch_default = cfg.batch.default_size,
            metrics_window = cfg.adaptive.metrics_window,
            "orchestrator built"
        );

        let policy = Arc::new(LoadPolicyEngine::new(cfg, clock));
        Ok(BatchOrchestrator::new(Components {
            policy,
            metrics,
            retry,
            executor,
            outcomes,
            pool,
            shutdown,
            mode: self.mode,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_executor_fails() {
        let err = OrchestratorBuilder::new(SchedulerConfig::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("session.program"));
    }

    #[test]
    fn build_with_invalid_config_fails() {
        let mut cfg = SchedulerConfig::default();
        cfg.batch.min_size = 0;
        let err = OrchestratorBuilder::new(cfg).build().unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn build_with_program() {
        let mut cfg = SchedulerConfig::default();
        cfg.session.program = "true".into();
        let orchestrator = OrchestratorBuilder::new(cfg)
            .with_mode(RunMode::CheckOnly)
            .build()
            .unwrap();
        assert_eq!(orchestrator.state(), crate::core::OrchestratorState::Idle);
    }
}
