//! Run Orchestrator
//!
//! In-memory table of evaluation runs. Each run owns an append-only event log
//! that only the orchestrator and the run's executor write to. Streams replay
//! the log from the start and then follow it until the run is terminal, so
//! every consumer sees the same sequence and it always agrees with `status`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Horizon, ModelKind};
use crate::runs::events::{Run, RunArtifacts, RunEvent, RunStatus};
use crate::runs::executor::{RunContext, RunExecutor, SimulatedEvaluation};
use crate::runs::RetentionPolicy;

pub const RUN_NOT_FOUND: &str = "Run not found";

struct RunState {
    run: Run,
    events: Vec<RunEvent>,
}

/// A run record and its event log under one lock.
pub struct RunEntry {
    state: RwLock<RunState>,
    /// Number of events in the log; bumped after every append
    notify: watch::Sender<usize>,
}

impl RunEntry {
    fn new(run: Run) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            state: RwLock::new(RunState {
                run,
                events: Vec::new(),
            }),
            notify,
        }
    }

    pub(crate) fn snapshot(&self) -> Run {
        self.state.read().run.clone()
    }

    /// Mutate the record and log together, then wake followers.
    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Run, &mut Vec<RunEvent>),
    {
        let len = {
            let mut state = self.state.write();
            let RunState { run, events } = &mut *state;
            f(run, events);
            events.len()
        };
        self.notify.send_replace(len);
    }

    fn set_status(&self, status: RunStatus) {
        self.update(|run, events| {
            run.status = status;
            events.push(RunEvent::Status {
                status,
                progress: run.progress,
            });
        });
    }

    fn complete(&self, artifacts: RunArtifacts) {
        self.update(|run, events| {
            run.status = RunStatus::Done;
            run.progress = 100;
            run.completed_at = Some(Utc::now());
            events.push(RunEvent::Artifact {
                metrics_path: artifacts.metrics_path.clone(),
                plot_path: artifacts.plot_path.clone(),
            });
            events.push(RunEvent::Complete {
                status: RunStatus::Done,
            });
            run.artifacts = Some(artifacts);
        });
    }

    fn fail(&self, cause: String) {
        self.update(|run, events| {
            run.status = RunStatus::Error;
            run.completed_at = Some(Utc::now());
            events.push(RunEvent::Error {
                message: cause.clone(),
            });
            run.error = Some(cause);
        });
    }
}

/// Cursor over one run's event log.
pub struct RunSubscription {
    entry: Arc<RunEntry>,
    changes: watch::Receiver<usize>,
    cursor: usize,
    finished: bool,
}

impl RunSubscription {
    fn new(entry: Arc<RunEntry>) -> Self {
        // subscribe before the first read so no append can slip between them
        let changes = entry.notify.subscribe();
        Self {
            entry,
            changes,
            cursor: 0,
            finished: false,
        }
    }

    /// Next event in log order; `None` after the terminal event has been read.
    pub async fn next(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }

        loop {
            {
                let state = self.entry.state.read();
                if let Some(event) = state.events.get(self.cursor) {
                    self.cursor += 1;
                    self.finished = event.is_terminal();
                    return Some(event.clone());
                }
                if state.run.status.is_terminal() {
                    return None;
                }
            }

            if self.changes.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, RunEvent> {
        stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
        .boxed()
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

pub struct RunOrchestrator {
    runs: RwLock<HashMap<String, Arc<RunEntry>>>,
    executor: Arc<dyn RunExecutor>,
    retention: RetentionPolicy,
}

impl RunOrchestrator {
    pub fn new(executor: Arc<dyn RunExecutor>, retention: RetentionPolicy) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            executor,
            retention,
        }
    }

    /// Orchestrator backed by [`SimulatedEvaluation`].
    pub fn simulated(step_delay: Duration, retention: RetentionPolicy) -> Self {
        Self::new(Arc::new(SimulatedEvaluation::new(step_delay)), retention)
    }

    /// Register a run and start it in the background. Returns the run id
    /// immediately. Must be called inside a tokio runtime.
    pub fn start_run(&self, model: ModelKind, horizon: Horizon, fold_id: Option<i64>) -> String {
        let run_id = Uuid::new_v4().to_string();
        let entry = Arc::new(RunEntry::new(Run::new(run_id.clone(), model, horizon, fold_id)));
        entry.update(|run, events| {
            events.push(RunEvent::Status {
                status: run.status,
                progress: run.progress,
            })
        });

        {
            let mut runs = self.runs.write();
            self.prune(&mut runs);
            runs.insert(run_id.clone(), entry.clone());
        }

        info!(run_id = %run_id, model = %model, horizon = %horizon, fold_id = ?fold_id, "Run queued");
        tokio::spawn(supervise(entry, self.executor.clone()));

        run_id
    }

    pub fn status(&self, run_id: &str) -> Option<Run> {
        self.runs.read().get(run_id).map(|entry| entry.snapshot())
    }

    pub fn subscribe(&self, run_id: &str) -> Option<RunSubscription> {
        let entry = self.runs.read().get(run_id).cloned()?;
        Some(RunSubscription::new(entry))
    }

    /// Replay-then-follow event stream; an unknown id yields a single error event.
    pub fn stream_run(&self, run_id: &str) -> BoxStream<'static, RunEvent> {
        match self.subscribe(run_id) {
            Some(sub) => sub.into_stream(),
            None => {
                debug!(run_id = %run_id, "Stream requested for unknown run");
                stream::iter(vec![RunEvent::Error {
                    message: RUN_NOT_FOUND.to_string(),
                }])
                .boxed()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    /// Drop expired terminal runs, then the oldest terminal runs until there
    /// is room for one more. Active runs are never removed.
    fn prune(&self, runs: &mut HashMap<String, Arc<RunEntry>>) {
        let now = Utc::now();
        let mut terminal: Vec<(String, chrono::DateTime<Utc>)> = runs
            .iter()
            .filter_map(|(id, entry)| {
                let run = entry.snapshot();
                run.status
                    .is_terminal()
                    .then(|| (id.clone(), run.completed_at.unwrap_or(run.created_at)))
            })
            .collect();
        terminal.sort_by_key(|(_, finished)| *finished);

        let before = runs.len();

        if let Some(ttl) = self.retention.terminal_ttl.and_then(|t| chrono::Duration::from_std(t).ok()) {
            terminal.retain(|(id, finished)| {
                let expired = now - *finished > ttl;
                if expired {
                    runs.remove(id);
                }
                !expired
            });
        }

        let mut oldest = terminal.into_iter();
        while runs.len() >= self.retention.max_runs {
            match oldest.next() {
                Some((id, _)) => {
                    runs.remove(&id);
                }
                None => {
                    warn!(
                        runs = runs.len(),
                        max_runs = self.retention.max_runs,
                        "Run table over capacity with only active runs"
                    );
                    break;
                }
            }
        }

        if runs.len() < before {
            debug!(evicted = before - runs.len(), remaining = runs.len(), "Pruned finished runs");
        }
    }
}

/// Drives one run from `queued` to a terminal state.
async fn supervise(entry: Arc<RunEntry>, executor: Arc<dyn RunExecutor>) {
    entry.set_status(RunStatus::Running);
    let ctx = RunContext::new(entry.clone());
    let run_id = ctx.run_id().to_string();

    let outcome = tokio::spawn(async move { executor.execute(ctx).await }).await;

    match outcome {
        Ok(Ok(artifacts)) => {
            info!(run_id = %run_id, "Run completed");
            entry.complete(artifacts);
        }
        Ok(Err(e)) => {
            let cause = format!("{:#}", e);
            error!(run_id = %run_id, error = %cause, "Run failed");
            entry.fail(cause);
        }
        Err(e) => {
            let cause = if e.is_panic() {
                "evaluation task panicked".to_string()
            } else {
                "evaluation task cancelled".to_string()
            };
            error!(run_id = %run_id, error = %cause, "Run aborted");
            entry.fail(cause);
        }
    }
}
