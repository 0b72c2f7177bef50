//! Evaluation runs
//!
//! Runs live only in process memory. Each one moves `queued -> running ->
//! done | error` on a background task and publishes what it does as events.

pub mod events;
pub mod executor;
pub mod orchestrator;

#[cfg(test)]
mod orchestrator_tests;

use std::time::Duration;

pub use events::{Run, RunArtifacts, RunEvent, RunStatus};
pub use executor::{RunContext, RunExecutor, SimulatedEvaluation};
pub use orchestrator::{RunOrchestrator, RunSubscription, RUN_NOT_FOUND};

/// Bounds on the run table. Only terminal runs are ever evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Table size at which the oldest terminal runs start being evicted
    pub max_runs: usize,
    /// Terminal runs older than this are dropped; `None` keeps them until capacity
    pub terminal_ttl: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_runs: 1000,
            terminal_ttl: Some(Duration::from_secs(3600)),
        }
    }
}
