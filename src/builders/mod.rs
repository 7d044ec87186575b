//! Builders to construct scheduler components from configuration.

pub mod orchestrator_builder;

pub use orchestrator_builder::OrchestratorBuilder;
