//! The workflow engine: drives one source through an ordered list of steps.

use super::builder::{Pipeline, StepsBuilder, WorkflowBuilder, WorkflowType};
use super::reporting::{PipelineStatusReport, ProgressReporter, StatusReporter};
use crate::catalog::{CatalogClient, ServiceConnectionResolver, ServiceType};
use crate::config::WorkflowConfig;
use crate::core::{PipelineState, Record, StepRole};
use crate::errors::{panic_message, Result, StepError, WorkflowError};
use crate::events::{EventSink, SUMMARY_EVENT};
use crate::observability;
use crate::status::{FailureTolerance, Status, WorkflowSummary};
use crate::steps::{Source, SourceItem, Step, StepContext};
use crate::timer::RepeatedTimer;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct StepEntry<R: Record> {
    step: Step<R>,
    ctx: StepContext,
}

/// A single run of a metadata workflow.
///
/// Built by [`WorkflowBuilder`], which resolves the service connection before
/// any step exists. [`execute`](Self::execute) runs the pipeline once and
/// always finishes with [`stop`](Self::stop), which joins the progress timer
/// and closes the catalog client and every step exactly once.
///
/// Dropping a workflow that was never executed or stopped joins the timer but
/// does not close its steps.
pub struct Workflow<R: Record> {
    config: WorkflowConfig,
    kind: WorkflowType,
    run_id: Uuid,
    catalog: Arc<dyn CatalogClient>,
    source: Box<dyn Source<R>>,
    source_ctx: StepContext,
    steps: Vec<StepEntry<R>>,
    statuses: Vec<Arc<Status>>,
    tolerance: FailureTolerance,
    reporter: Arc<dyn StatusReporter>,
    events: Arc<dyn EventSink>,
    timer: RepeatedTimer,
    state: PipelineState,
    started_at: DateTime<Utc>,
    executed: bool,
    stopped: bool,
}

impl<R: Record> fmt::Debug for Workflow<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("kind", &self.kind)
            .field("run_id", &self.run_id)
            .field("source", &self.source.name())
            .field("steps", &self.steps.iter().map(|e| &e.step).collect::<Vec<_>>())
            .field("state", &self.state)
            .field("timer", &self.timer)
            .finish()
    }
}

impl<R: Record> Workflow<R> {
    pub(super) async fn create(
        builder: WorkflowBuilder,
        steps_builder: &dyn StepsBuilder<R>,
    ) -> Result<Self> {
        let WorkflowBuilder {
            mut config,
            catalog,
            kind,
            reporter,
            events,
            report_interval,
        } = builder;

        config.validate()?;
        observability::init_logging(config.workflow_config.logger_level);
        let service_type = ServiceType::from_source_type(&config.source.source_type)?;
        ServiceConnectionResolver::new(catalog.as_ref())
            .resolve(&mut config.source, service_type)
            .await?;

        let Pipeline { source, steps } = steps_builder.build(&config, &catalog)?;
        let run_id = config.pipeline_run_id.unwrap_or_else(Uuid::new_v4);

        let source_status = Arc::new(Status::new(source.name(), StepRole::Source));
        let source_ctx = StepContext::new(run_id, Arc::clone(&source_status));
        let steps: Vec<StepEntry<R>> = steps
            .into_iter()
            .map(|step| {
                let status = Arc::new(Status::new(step.name(), step.role()));
                StepEntry {
                    ctx: StepContext::new(run_id, status),
                    step,
                }
            })
            .collect();
        let statuses: Vec<Arc<Status>> = std::iter::once(source_status)
            .chain(steps.iter().map(|e| Arc::clone(e.ctx.status())))
            .collect();

        let bulk_sinks = steps
            .iter()
            .filter(|e| e.step.role() == StepRole::BulkSink)
            .count();
        if bulk_sinks > 1 {
            warn!(
                run_id = %run_id,
                bulk_sinks,
                "More than one bulk sink configured, only the first one will run"
            );
        }

        let interval = report_interval.unwrap_or_else(|| config.report_interval());
        let progress = ProgressReporter::new(run_id, statuses.clone(), Arc::clone(&events));
        let timer = RepeatedTimer::new(format!("{kind}-progress"), interval, move || {
            progress.tick();
        })?;

        let workflow = Self {
            tolerance: config.failure_tolerance(),
            config,
            kind,
            run_id,
            catalog,
            source,
            source_ctx,
            steps,
            statuses,
            reporter,
            events,
            timer,
            state: PipelineState::Running,
            started_at: Utc::now(),
            executed: false,
            stopped: false,
        };
        info!(
            run_id = %run_id,
            kind = %kind,
            service_type = %service_type,
            source = %workflow.source.name(),
            steps = workflow.steps.len(),
            "Workflow created"
        );
        send_report(workflow.reporter.as_ref(), workflow.status_report()).await;
        Ok(workflow)
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the workflow kind.
    #[must_use]
    pub fn kind(&self) -> WorkflowType {
        self.kind
    }

    /// Returns the current pipeline state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the configuration with the resolved service connection.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Aggregates the status of the source and every step.
    #[must_use]
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary::new(self.statuses.iter().map(|s| s.snapshot()).collect())
    }

    /// Fails if the finished run ended in [`PipelineState::Failed`].
    pub fn raise_from_status(&self) -> Result<()> {
        if self.state != PipelineState::Failed {
            return Ok(());
        }
        let totals = self.summary().totals();
        Err(WorkflowError::ExecutionFailed {
            state: self.state,
            failed: totals.failed,
            processed: totals.processed(),
        })
    }

    /// Runs the pipeline to completion and returns the final state.
    ///
    /// Source and bulk sink errors, and panics escaping the loop, mark the run
    /// failed and are returned after cleanup. A workflow runs at most once and
    /// never after [`stop`](Self::stop).
    pub async fn execute(&mut self) -> Result<PipelineState> {
        if self.executed {
            return Err(WorkflowError::AlreadyExecuted(self.run_id.to_string()));
        }
        if self.stopped {
            return Err(WorkflowError::Stopped(self.run_id.to_string()));
        }
        self.executed = true;

        let result = match self.timer.start() {
            Ok(()) => match AssertUnwindSafe(self.run_steps()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(WorkflowError::Panicked(panic_message(payload.as_ref()))),
            },
            Err(err) => Err(err.into()),
        };

        let summary = self.summary();
        let outcome = match result {
            Ok(()) => {
                let state = summary.compute_state(&self.tolerance);
                self.finish(state, &summary).await;
                Ok(state)
            }
            Err(err) => {
                error!(run_id = %self.run_id, kind = %self.kind, "Workflow failed: {err}");
                self.finish(PipelineState::Failed, &summary).await;
                Err(err)
            }
        };
        self.stop().await;
        outcome
    }

    async fn run_steps(&mut self) -> Result<()> {
        info!(
            run_id = %self.run_id,
            kind = %self.kind,
            source = %self.source.name(),
            "Starting workflow"
        );
        loop {
            let item = self
                .source
                .next_record(&self.source_ctx)
                .await
                .map_err(|source| WorkflowError::Source {
                    step: self.source_ctx.step_name().to_string(),
                    source,
                })?;
            let status = self.source_ctx.status();
            let record = match item {
                None => break,
                Some(SourceItem::Record(record)) => {
                    status.scanned(&record.key());
                    record
                }
                Some(SourceItem::Filtered { key, reason }) => {
                    status.filter(key, reason);
                    continue;
                }
                Some(SourceItem::Failed(failure)) => {
                    status.record_failure(failure);
                    continue;
                }
            };
            self.route(record).await;
        }
        self.run_bulk_sink().await
    }

    async fn route(&mut self, record: R) {
        let mut current = record;
        for entry in &mut self.steps {
            match entry.step.process(current, &entry.ctx).await {
                Some(next) => current = next,
                None => return,
            }
        }
    }

    async fn run_bulk_sink(&mut self) -> Result<()> {
        let Some(entry) = self
            .steps
            .iter_mut()
            .find(|e| e.step.role() == StepRole::BulkSink)
        else {
            debug!(run_id = %self.run_id, "No bulk sink configured");
            return Ok(());
        };
        let StepEntry { step, ctx } = entry;
        if let Step::BulkSink(sink) = step {
            info!(run_id = %ctx.run_id(), step = %sink.name(), "Running bulk sink");
            sink.run(ctx).await.map_err(|source| WorkflowError::BulkSink {
                step: ctx.step_name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    async fn finish(&mut self, state: PipelineState, summary: &WorkflowSummary) {
        self.state = state;
        info!(
            run_id = %self.run_id,
            state = %state,
            failure_ratio = summary.failure_ratio(),
            "Workflow finished\n{}",
            summary.render()
        );
        self.events
            .emit(
                SUMMARY_EVENT,
                Some(json!({
                    "run_id": self.run_id.to_string(),
                    "state": state,
                    "totals": summary.totals(),
                    "summary": summary.render(),
                })),
            )
            .await;
        send_report(self.reporter.as_ref(), self.status_report()).await;
    }

    fn status_report(&self) -> Option<PipelineStatusReport> {
        let Some(pipeline_fqn) = self.config.ingestion_pipeline_fqn.clone() else {
            debug!(
                run_id = %self.run_id,
                state = %self.state,
                "No ingestion pipeline FQN, skipping status report"
            );
            return None;
        };
        Some(PipelineStatusReport {
            run_id: self.run_id,
            pipeline_fqn,
            kind: self.kind,
            state: self.state,
            started_at: self.started_at,
            ended_at: self.state.is_terminal().then(Utc::now),
            steps: self.summary().steps,
        })
    }

    /// Stops the timer, then closes the catalog client, the source and every
    /// step in order.
    ///
    /// Close failures are logged and never stop the remaining closes. Calling
    /// this more than once has no further effect.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if self.timer.stop() {
            debug!(run_id = %self.run_id, "Progress timer stopped");
        }
        close_quietly("catalog client", self.catalog.close()).await;

        let name = format!("{} '{}'", StepRole::Source, self.source_ctx.step_name());
        close_quietly(&name, self.source.close()).await;
        for entry in &mut self.steps {
            let name = format!("{} '{}'", entry.step.role(), entry.ctx.step_name());
            close_quietly(&name, entry.step.close()).await;
        }
        info!(run_id = %self.run_id, state = %self.state, "Workflow stopped");
    }
}

async fn send_report(reporter: &dyn StatusReporter, report: Option<PipelineStatusReport>) {
    let Some(report) = report else { return };
    if let Err(err) = reporter.report(&report).await {
        warn!(
            run_id = %report.run_id,
            state = %report.state,
            "Failed to report pipeline status: {err:#}"
        );
    }
}

async fn close_quietly<F>(component: &str, close: F)
where
    F: Future<Output = std::result::Result<(), StepError>>,
{
    match AssertUnwindSafe(close).catch_unwind().await {
        Ok(Ok(())) => debug!(component, "Closed"),
        Ok(Err(err)) => warn!(component, "Failed to close: {err:#}"),
        Err(payload) => warn!(
            component,
            "Panicked while closing: {}",
            panic_message(payload.as_ref())
        ),
    }
}
