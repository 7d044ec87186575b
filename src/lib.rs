//! # Roster Scheduler
//!
//! A resource-aware control plane that runs a per-account session task across
//! a roster of accounts, indefinitely, on hosts with tight and variable
//! resources.
//!
//! The session itself (logging in, flipping a remote switch) is delegated to a
//! [`core::SessionExecutor`]. This crate decides everything around it: how
//! many sessions run at once, how large each batch is, how long to wait
//! between batches and cycles, and how failures are classified and retried.
//! All of it adapts to live CPU, memory, disk and worker-process load.
//!
//! ## Components
//!
//! - **`SystemMonitor` / `MetricsCache`**: sample host metrics, cached for a
//!   refresh interval
//! - **`LoadPolicyEngine`**: load score, load category and the operational
//!   parameters derived from them
//! - **`FailureClassifier`**: ordered rule table mapping failures to a
//!   category and severity
//! - **`RetryEngine`**: bounded, classified retries with backoff, dampening and
//!   escalation
//! - **`BatchOrchestrator`**: the cycle/batch loop feeding outcomes back into
//!   deferral decisions
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use roster_scheduler::builders::OrchestratorBuilder;
//! use roster_scheduler::config::SchedulerConfig;
//! use roster_scheduler::core::Account;
//!
//! let orchestrator = OrchestratorBuilder::new(SchedulerConfig::default())
//!     .with_executor(Arc::new(my_executor))
//!     .build()?;
//! let roster = vec![Account::new("alice", "secret")];
//! let summary = orchestrator.run(&roster).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Metrics, load policy, classification, retry and the batch loop.
pub mod core;
/// Configuration models for load policy, retry, batching and cycle timing.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters for session programs and roster files.
pub mod infra;
/// Runtime plumbing: shutdown, OS signals and the status surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
