//! Run Orchestrator Tests
//!
//! Simulated runs use a 1ms step delay so a full lifecycle takes a few ms.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::models::{Horizon, ModelKind};
use crate::runs::{
    RetentionPolicy, RunArtifacts, RunContext, RunEvent, RunExecutor, RunOrchestrator, RunStatus,
    RUN_NOT_FOUND,
};

const FAST: Duration = Duration::from_millis(1);

fn horizon(h: i64) -> Horizon {
    Horizon::try_from(h).unwrap()
}

fn simulated() -> RunOrchestrator {
    RunOrchestrator::simulated(FAST, RetentionPolicy::default())
}

async fn collect(orchestrator: &RunOrchestrator, run_id: &str) -> Vec<RunEvent> {
    tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.stream_run(run_id).collect::<Vec<_>>(),
    )
    .await
    .expect("stream did not finish")
}

struct FailingExecutor;

#[async_trait::async_trait]
impl RunExecutor for FailingExecutor {
    async fn execute(&self, ctx: RunContext) -> anyhow::Result<RunArtifacts> {
        ctx.log("Loading historical data...");
        ctx.progress(30);
        anyhow::bail!("model crashed at step 3")
    }
}

struct PanickingExecutor;

#[async_trait::async_trait]
impl RunExecutor for PanickingExecutor {
    async fn execute(&self, _ctx: RunContext) -> anyhow::Result<RunArtifacts> {
        panic!("boom")
    }
}

/// Finishes arima runs at once; every other model never finishes.
struct ArimaOnlyExecutor;

#[async_trait::async_trait]
impl RunExecutor for ArimaOnlyExecutor {
    async fn execute(&self, ctx: RunContext) -> anyhow::Result<RunArtifacts> {
        if ctx.model() != ModelKind::Arima {
            std::future::pending::<()>().await;
        }
        Ok(RunArtifacts::for_run(ctx.run_id()))
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_start_returns_queued_uuid() {
    let orchestrator = simulated();
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(7), Some(1));

    assert!(uuid::Uuid::parse_str(&run_id).is_ok());

    // the background task has not been polled yet on the current-thread runtime
    let run = orchestrator.status(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.progress, 0);
    assert_eq!(run.fold_id, Some(1));
    assert!(run.completed_at.is_none());
}

#[tokio::test]
async fn test_simulated_run_completes_with_ordered_events() {
    let orchestrator = simulated();
    let run_id = orchestrator.start_run(ModelKind::Seq2seqAttentionQuantile, horizon(14), None);

    let events = collect(&orchestrator, &run_id).await;

    assert_eq!(
        events[0],
        RunEvent::Status {
            status: RunStatus::Queued,
            progress: 0
        }
    );
    assert_eq!(
        events[1],
        RunEvent::Status {
            status: RunStatus::Running,
            progress: 0
        }
    );

    let logs: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Log { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(logs.len(), 7);
    assert_eq!(
        logs[0],
        "Starting evaluation for model=seq2seq_attention_quantile, horizon=14"
    );
    assert_eq!(logs[6], "Evaluation complete!");

    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress { progress } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

    let n = events.len();
    assert_eq!(
        events[n - 2],
        RunEvent::Artifact {
            metrics_path: format!("/artifacts/{}/metrics.json", run_id),
            plot_path: format!("/artifacts/{}/forecast_plot.png", run_id),
        }
    );
    assert_eq!(
        events[n - 1],
        RunEvent::Complete {
            status: RunStatus::Done
        }
    );

    let run = orchestrator.status(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.progress, 100);
    assert!(run.completed_at.is_some());
    assert!(run.error.is_none());
    assert_eq!(run.artifacts, Some(RunArtifacts::for_run(&run_id)));
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let orchestrator = simulated();
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(1), None);

    let mut sub = orchestrator.subscribe(&run_id).unwrap();
    let mut last = 0u8;
    let mut polled = Vec::new();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), sub.next())
            .await
            .expect("stream stalled");
        let Some(event) = event else { break };

        if let RunEvent::Progress { progress } = event {
            assert!(progress >= last);
            last = progress;
        }
        polled.push(orchestrator.status(&run_id).unwrap().progress);
    }

    assert_eq!(last, 100);
    assert!(polled.windows(2).all(|w| w[0] <= w[1]));
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_failing_executor_records_cause() {
    let orchestrator = RunOrchestrator::new(Arc::new(FailingExecutor), RetentionPolicy::default());
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(7), None);

    let events = collect(&orchestrator, &run_id).await;

    assert_eq!(
        events.last(),
        Some(&RunEvent::Error {
            message: "model crashed at step 3".to_string()
        })
    );
    assert!(events.contains(&RunEvent::Progress { progress: 30 }));
    assert!(!events.iter().any(|e| matches!(e, RunEvent::Complete { .. })));

    let run = orchestrator.status(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error.as_deref(), Some("model crashed at step 3"));
    assert_eq!(run.progress, 30);
    assert!(run.artifacts.is_none());
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn test_panicking_executor_marks_run_failed() {
    let orchestrator = RunOrchestrator::new(Arc::new(PanickingExecutor), RetentionPolicy::default());
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(1), None);

    let events = collect(&orchestrator, &run_id).await;
    assert!(events.last().unwrap().is_terminal());

    let run = orchestrator.status(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.error.as_deref(), Some("evaluation task panicked"));
}

// =============================================================================
// STREAMS
// =============================================================================

#[tokio::test]
async fn test_unknown_run() {
    let orchestrator = simulated();

    assert!(orchestrator.status("missing").is_none());
    assert!(orchestrator.subscribe("missing").is_none());

    let events = collect(&orchestrator, "missing").await;
    assert_eq!(
        events,
        vec![RunEvent::Error {
            message: RUN_NOT_FOUND.to_string()
        }]
    );
}

#[tokio::test]
async fn test_every_subscriber_sees_same_sequence() {
    let orchestrator = Arc::new(simulated());
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(30), None);

    let early = {
        let orchestrator = orchestrator.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move { collect(&orchestrator, &run_id).await })
    };

    tokio::time::sleep(Duration::from_millis(4)).await;
    let middle = collect(&orchestrator, &run_id).await;
    let early = early.await.unwrap();
    let late = collect(&orchestrator, &run_id).await;

    assert_eq!(early, middle);
    assert_eq!(middle, late);
    assert!(matches!(late.last(), Some(RunEvent::Complete { .. })));
}

#[tokio::test]
async fn test_subscription_ends_after_terminal_event() {
    let orchestrator = simulated();
    let run_id = orchestrator.start_run(ModelKind::Arima, horizon(7), None);
    let mut sub = orchestrator.subscribe(&run_id).unwrap();

    let mut terminal = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), sub.next())
            .await
            .expect("subscription stalled");
        let Some(event) = event else { break };
        if event.is_terminal() {
            terminal += 1;
        }
    }

    assert_eq!(terminal, 1);
    assert!(sub.next().await.is_none());
}

// =============================================================================
// RETENTION
// =============================================================================

async fn wait_done(orchestrator: &RunOrchestrator, run_id: &str) {
    collect(orchestrator, run_id).await;
}

#[tokio::test]
async fn test_capacity_evicts_oldest_terminal_run() {
    let orchestrator = RunOrchestrator::new(
        Arc::new(ArimaOnlyExecutor),
        RetentionPolicy {
            max_runs: 2,
            terminal_ttl: None,
        },
    );

    let first = orchestrator.start_run(ModelKind::Arima, horizon(1), None);
    wait_done(&orchestrator, &first).await;
    let second = orchestrator.start_run(ModelKind::Arima, horizon(1), None);
    wait_done(&orchestrator, &second).await;

    let third = orchestrator.start_run(ModelKind::Arima, horizon(1), None);

    assert_eq!(orchestrator.len(), 2);
    assert!(orchestrator.status(&first).is_none());
    assert!(orchestrator.status(&second).is_some());
    assert!(orchestrator.status(&third).is_some());
}

#[tokio::test]
async fn test_active_runs_never_evicted() {
    let orchestrator = RunOrchestrator::new(
        Arc::new(ArimaOnlyExecutor),
        RetentionPolicy {
            max_runs: 2,
            terminal_ttl: Some(Duration::from_millis(1)),
        },
    );

    let ids: Vec<String> = (0..4)
        .map(|_| orchestrator.start_run(ModelKind::Seq2seqAttentionQuantile, horizon(7), None))
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let extra = orchestrator.start_run(ModelKind::Seq2seqAttentionQuantile, horizon(7), None);

    assert_eq!(orchestrator.len(), 5);
    for id in ids.iter().chain(std::iter::once(&extra)) {
        let run = orchestrator.status(id).unwrap();
        assert!(!run.status.is_terminal());
    }
}

#[tokio::test]
async fn test_expired_terminal_runs_dropped() {
    let orchestrator = RunOrchestrator::new(
        Arc::new(ArimaOnlyExecutor),
        RetentionPolicy {
            max_runs: 100,
            terminal_ttl: Some(Duration::from_millis(1)),
        },
    );

    let finished = orchestrator.start_run(ModelKind::Arima, horizon(1), None);
    wait_done(&orchestrator, &finished).await;
    let active = orchestrator.start_run(ModelKind::Seq2seqAttentionQuantile, horizon(1), None);
    tokio::time::sleep(Duration::from_millis(10)).await;

    orchestrator.start_run(ModelKind::Seq2seqAttentionQuantile, horizon(1), None);

    assert!(orchestrator.status(&finished).is_none());
    assert!(orchestrator.status(&active).is_some());
    assert_eq!(orchestrator.len(), 2);
}
