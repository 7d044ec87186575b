//! Operator-facing status and health models.

use serde::Serialize;

use crate::core::{
    ErrorStatistics, LoadCategory, MemoryPressure, MetricsSnapshot, OrchestratorState, OutcomeSnapshot,
    PoolStats, RunMode, TimeBucket,
};

/// Serializable snapshot of the running service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Orchestrator instance identifier.
    pub run_id: String,
    /// Control-loop state.
    pub state: OrchestratorState,
    /// Session run mode.
    pub mode: RunMode,
    /// Seconds since the orchestrator was built.
    pub uptime_secs: u64,
    /// Cycles started so far.
    pub cycles_started: u64,
    /// Deferrals that ran out of rounds while load was still high.
    pub deferral_limit_hits: u64,
    /// Current load score.
    pub load_score: f64,
    /// Current load category.
    pub category: LoadCategory,
    /// Current time-of-day bucket.
    pub time_bucket: TimeBucket,
    /// Current memory pressure.
    pub memory_pressure: MemoryPressure,
    /// Concurrency the policy would use now.
    pub optimal_concurrency: usize,
    /// Batch size the policy would use now.
    pub batch_size: usize,
    /// New work would be deferred now.
    pub defer: bool,
    /// Rolling outcome rates.
    pub outcomes: OutcomeSnapshot,
    /// Error counts.
    pub errors: ErrorStatistics,
    /// Worker pool counters.
    pub pool: PoolStats,
    /// Raw metrics the status was computed from.
    pub metrics: MetricsSnapshot,
    /// Shutdown has been requested.
    pub shutting_down: bool,
}

/// Health response.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Reason when not healthy.
    pub reason: Option<String>,
}

/// Derive a health payload from a status snapshot.
///
/// The service is unhealthy while shutting down or under critical memory
/// pressure.
#[must_use]
pub fn health(status: &ServiceStatus) -> Health {
    let reason = if status.shutting_down {
        Some("shutting down".to_string())
    } else if status.memory_pressure == MemoryPressure::Critical {
        Some("critical memory pressure".to_string())
    } else {
        None
    };
    Health {
        ok: reason.is_none(),
        reason,
    }
}
