//! Pipeline status reporting and periodic progress events.

use super::builder::WorkflowType;
use crate::core::PipelineState;
use crate::events::{EventSink, PROGRESS_EVENT};
use crate::status::{Status, StatusSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// State of one run, as persisted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusReport {
    /// The run identifier.
    pub run_id: Uuid,
    /// Fully qualified name of the deployed ingestion pipeline.
    pub pipeline_fqn: String,
    /// The workflow kind.
    pub kind: WorkflowType,
    /// Current state.
    pub state: PipelineState,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Per-step status, source first.
    #[serde(default)]
    pub steps: Vec<StatusSnapshot>,
}

/// Persists pipeline state for external orchestration.
///
/// Errors are logged by the engine and never fail the run.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Records the given report.
    async fn report(&self, report: &PipelineStatusReport) -> anyhow::Result<()>;
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusReporter;

#[async_trait]
impl StatusReporter for NoOpStatusReporter {
    async fn report(&self, _report: &PipelineStatusReport) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes each report to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStatusReporter;

#[async_trait]
impl StatusReporter for LoggingStatusReporter {
    async fn report(&self, report: &PipelineStatusReport) -> anyhow::Result<()> {
        info!(
            run_id = %report.run_id,
            pipeline = %report.pipeline_fqn,
            kind = %report.kind,
            state = %report.state,
            steps = report.steps.len(),
            "Pipeline status"
        );
        Ok(())
    }
}

/// Timer callback that emits the live counters of every step.
pub(crate) struct ProgressReporter {
    run_id: Uuid,
    statuses: Vec<Arc<Status>>,
    events: Arc<dyn EventSink>,
}

impl ProgressReporter {
    pub(crate) fn new(
        run_id: Uuid,
        statuses: Vec<Arc<Status>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            run_id,
            statuses,
            events,
        }
    }

    /// Reads counters without locking; values may be mid-update.
    pub(crate) fn payload(&self) -> serde_json::Value {
        let steps: Vec<serde_json::Value> = self
            .statuses
            .iter()
            .map(|status| {
                let counts = status.counts();
                json!({
                    "name": status.name(),
                    "role": status.role(),
                    "scanned": counts.scanned,
                    "filtered": counts.filtered,
                    "warnings": counts.warnings,
                    "failed": counts.failed,
                })
            })
            .collect();
        json!({ "run_id": self.run_id.to_string(), "steps": steps })
    }

    pub(crate) fn tick(&self) {
        for status in &self.statuses {
            let counts = status.counts();
            info!(
                run_id = %self.run_id,
                step = %status.name(),
                role = %status.role(),
                scanned = counts.scanned,
                filtered = counts.filtered,
                warnings = counts.warnings,
                failed = counts.failed,
                "Progress"
            );
        }
        self.events.try_emit(PROGRESS_EVENT, Some(self.payload()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepRole;
    use crate::events::CollectingEventSink;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_progress_payload_shape() {
        let source = Arc::new(Status::new("mysql", StepRole::Source));
        let sink = Arc::new(Status::new("metadata-rest", StepRole::Sink));
        source.scanned("db.a");
        source.scanned("db.b");
        sink.scanned("db.a");
        sink.failed("db.b", "conflict", None);

        let events = Arc::new(CollectingEventSink::new());
        let run_id = Uuid::new_v4();
        let progress = ProgressReporter::new(run_id, vec![source, sink], events.clone());
        progress.tick();

        let emitted = events.events_of_type(PROGRESS_EVENT);
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].clone().unwrap(),
            json!({
                "run_id": run_id.to_string(),
                "steps": [
                    {
                        "name": "mysql", "role": "source",
                        "scanned": 2, "filtered": 0, "warnings": 0, "failed": 0
                    },
                    {
                        "name": "metadata-rest", "role": "sink",
                        "scanned": 1, "filtered": 0, "warnings": 0, "failed": 1
                    },
                ]
            })
        );
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = PipelineStatusReport {
            run_id: Uuid::nil(),
            pipeline_fqn: "local_mysql.ingest".to_string(),
            kind: WorkflowType::Ingestion,
            state: PipelineState::PartialSuccess,
            started_at: Utc::now(),
            ended_at: None,
            steps: Vec::new(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["pipelineFqn"], json!("local_mysql.ingest"));
        assert_eq!(value["state"], json!("partialSuccess"));
        assert!(value.get("endedAt").is_none());
    }

    #[tokio::test]
    async fn test_builtin_reporters_accept_reports() {
        let report = PipelineStatusReport {
            run_id: Uuid::new_v4(),
            pipeline_fqn: "svc.pipeline".to_string(),
            kind: WorkflowType::Usage,
            state: PipelineState::Running,
            started_at: Utc::now(),
            ended_at: None,
            steps: Vec::new(),
        };

        assert!(NoOpStatusReporter.report(&report).await.is_ok());
        assert!(LoggingStatusReporter.report(&report).await.is_ok());
    }
}
