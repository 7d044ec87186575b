//! Configuration models for load policy, retry, batching and cycle timing.

pub mod scheduler;

pub use scheduler::{
    AdaptiveConfig, BackoffConfig, BatchConfig, ConcurrencyConfig, CycleConfig, LoadFactors,
    MemoryThresholds, MonitorConfig, RetryConfig, RetryPolicy, SchedulerConfig, ScoreConfig,
    SessionConfig, SleepConfig, TimeFactors, TimeoutConfig,
};
