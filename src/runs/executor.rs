//! Evaluation executors
//!
//! The orchestrator owns the run lifecycle; an executor only does the work and
//! reports through its [`RunContext`].

use std::sync::Arc;
use std::time::Duration;

use crate::models::{Horizon, ModelKind};
use crate::runs::events::{RunArtifacts, RunEvent};
use crate::runs::orchestrator::RunEntry;

/// Performs one evaluation. Errors and panics put the run into `error`.
#[async_trait::async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, ctx: RunContext) -> anyhow::Result<RunArtifacts>;
}

/// Handle an executor uses to publish into its run's event log.
#[derive(Clone)]
pub struct RunContext {
    entry: Arc<RunEntry>,
    run_id: String,
    model: ModelKind,
    horizon: Horizon,
    fold_id: Option<i64>,
}

impl RunContext {
    pub(crate) fn new(entry: Arc<RunEntry>) -> Self {
        let run = entry.snapshot();
        Self {
            entry,
            run_id: run.run_id,
            model: run.model,
            horizon: run.horizon,
            fold_id: run.fold_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn fold_id(&self) -> Option<i64> {
        self.fold_id
    }

    pub fn log(&self, message: impl Into<String>) {
        let event = RunEvent::log(message);
        self.entry.update(|_, events| events.push(event));
    }

    /// Raise progress to `percent` (capped at 100). Lower values are ignored.
    pub fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.entry.update(|run, events| {
            if percent > run.progress {
                run.progress = percent;
                events.push(RunEvent::Progress { progress: percent });
            }
        });
    }
}

// =============================================================================
// SIMULATED EVALUATION
// =============================================================================

const STEPS: u8 = 10;

/// Stand-in evaluation: ten 10% steps with the fixed log script spread across them.
pub struct SimulatedEvaluation {
    step_delay: Duration,
}

impl SimulatedEvaluation {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    fn script(model: ModelKind, horizon: Horizon) -> Vec<String> {
        vec![
            format!("Starting evaluation for model={}, horizon={}", model, horizon),
            "Loading historical data...".to_string(),
            "Training model...".to_string(),
            "Generating forecasts...".to_string(),
            "Calculating metrics...".to_string(),
            "Saving artifacts...".to_string(),
            "Evaluation complete!".to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl RunExecutor for SimulatedEvaluation {
    async fn execute(&self, ctx: RunContext) -> anyhow::Result<RunArtifacts> {
        let script = Self::script(ctx.model(), ctx.horizon());
        let mut logged = 0usize;

        for step in 1..=STEPS {
            tokio::time::sleep(self.step_delay).await;

            // lines due by this step, ending on the last line at 100%
            let due = (usize::from(step) * script.len()).div_ceil(usize::from(STEPS));
            while logged < due {
                ctx.log(script[logged].clone());
                logged += 1;
            }
            ctx.progress(step * (100 / STEPS));
        }

        Ok(RunArtifacts::for_run(ctx.run_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_mentions_run_parameters() {
        let script = SimulatedEvaluation::script(ModelKind::Arima, Horizon::try_from(14).unwrap());
        assert_eq!(script.len(), 7);
        assert_eq!(script[0], "Starting evaluation for model=arima, horizon=14");
        assert_eq!(script[6], "Evaluation complete!");
    }
}
