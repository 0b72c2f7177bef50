//! Run records and the events published about them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Horizon, ModelKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }
}

/// References to what a finished run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunArtifacts {
    pub metrics_path: String,
    pub plot_path: String,
}

impl RunArtifacts {
    /// Conventional artifact locations for `run_id`.
    pub fn for_run(run_id: &str) -> Self {
        Self {
            metrics_path: format!("/artifacts/{}/metrics.json", run_id),
            plot_path: format!("/artifacts/{}/forecast_plot.png", run_id),
        }
    }
}

/// Snapshot of one evaluation run; also the body of the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub run_id: String,
    pub status: RunStatus,
    /// 0..=100, never decreases
    pub progress: u8,
    pub model: ModelKind,
    pub horizon: Horizon,
    pub fold_id: Option<i64>,
    pub artifacts: Option<RunArtifacts>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Cause of failure when `status` is `error`
    pub error: Option<String>,
}

impl Run {
    pub fn new(run_id: String, model: ModelKind, horizon: Horizon, fold_id: Option<i64>) -> Self {
        Self {
            run_id,
            status: RunStatus::Queued,
            progress: 0,
            model,
            horizon,
            fold_id,
            artifacts: None,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// One entry of a run's event log, sent verbatim as an SSE `data:` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Status { status: RunStatus, progress: u8 },
    Log { message: String, timestamp: DateTime<Utc> },
    Progress { progress: u8 },
    Artifact { metrics_path: String, plot_path: String },
    Complete { status: RunStatus },
    Error { message: String },
}

impl RunEvent {
    pub fn log(message: impl Into<String>) -> Self {
        RunEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Complete { .. } | RunEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = RunEvent::Status {
            status: RunStatus::Queued,
            progress: 0,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "status", "status": "queued", "progress": 0})
        );

        let artifacts = RunArtifacts::for_run("abc");
        let event = RunEvent::Artifact {
            metrics_path: artifacts.metrics_path,
            plot_path: artifacts.plot_path,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "artifact",
                "metrics_path": "/artifacts/abc/metrics.json",
                "plot_path": "/artifacts/abc/forecast_plot.png"
            })
        );

        let event = RunEvent::Error {
            message: "Run not found".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "error", "message": "Run not found"})
        );
    }

    #[test]
    fn test_run_serializes_for_status_endpoint() {
        let run = Run::new(
            "id-1".into(),
            ModelKind::Arima,
            Horizon::try_from(7).unwrap(),
            Some(2),
        );
        let value = serde_json::to_value(&run).unwrap();

        assert_eq!(value["status"], "queued");
        assert_eq!(value["model"], "arima");
        assert_eq!(value["horizon"], 7);
        assert_eq!(value["fold_id"], 2);
        assert!(value["completed_at"].is_null());
        assert!(value["artifacts"].is_null());
    }
}
