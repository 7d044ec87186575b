//! Core scheduling: metrics, load policy, classification, retry and the batch loop.

pub mod classify;
pub mod error;
pub mod error_log;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod outcome;
pub mod policy;
pub mod retry;
pub mod worker_pool;

pub use classify::{ErrorCategory, FailureClassifier, Severity};
pub use error::{AppResult, Failure, RetryError, SchedulerError};
pub use error_log::{ErrorLog, ErrorRecord, ErrorStatistics};
pub use executor::{Account, RunMode, SessionExecutor, SessionOutcome};
pub use monitor::{MetricsCache, MetricsSnapshot, MetricsSource, StaticMetrics, SystemMonitor};
pub use orchestrator::{BatchOrchestrator, BatchResult, CycleResult, OrchestratorState, RunSummary};
pub use outcome::{OutcomeSnapshot, RollingOutcomeCounter};
pub use policy::{LoadCategory, LoadPolicyEngine, MemoryPressure, OperationKind, OperationalPolicy, TimeBucket};
pub use retry::{RetryEngine, RetryPlan};
pub use worker_pool::{BatchSlot, PoolError, PoolStats, WorkerPool};
