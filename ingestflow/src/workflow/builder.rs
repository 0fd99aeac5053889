//! Workflow kinds, pipeline assembly and the workflow builder.

use super::engine::Workflow;
use super::reporting::{NoOpStatusReporter, StatusReporter};
use crate::catalog::CatalogClient;
use crate::config::WorkflowConfig;
use crate::core::{Record, StepRole};
use crate::errors::Result;
use crate::events::{EventSink, LoggingEventSink};
use crate::steps::{Source, Step};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The kind of workflow being run.
///
/// Every kind shares the same engine; the kind only selects the steps
/// builder and labels logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Metadata extraction.
    #[default]
    Ingestion,
    /// Lineage extraction from query logs.
    Lineage,
    /// Usage statistics.
    Usage,
    /// Table and column profiling.
    Profiler,
    /// Data quality test execution.
    TestSuite,
    /// Data insight aggregation.
    DataInsight,
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingestion => "ingestion",
            Self::Lineage => "lineage",
            Self::Usage => "usage",
            Self::Profiler => "profiler",
            Self::TestSuite => "test_suite",
            Self::DataInsight => "data_insight",
        };
        f.write_str(name)
    }
}

/// One source followed by an ordered list of steps.
pub struct Pipeline<R: Record> {
    /// Produces the records of the run.
    pub source: Box<dyn Source<R>>,
    /// Steps in declaration order.
    pub steps: Vec<Step<R>>,
}

impl<R: Record> fmt::Debug for Pipeline<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.name())
            .field("steps", &self.steps)
            .finish()
    }
}

impl<R: Record> Pipeline<R> {
    /// Creates a pipeline with no steps after the source.
    pub fn new(source: impl Source<R> + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    /// Creates a pipeline from an already boxed source.
    #[must_use]
    pub fn from_boxed(source: Box<dyn Source<R>>) -> Self {
        Self {
            source,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step<R>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a step in place.
    pub fn push(&mut self, step: Step<R>) {
        self.steps.push(step);
    }

    /// Returns the number of steps with the given role.
    #[must_use]
    pub fn count_role(&self, role: StepRole) -> usize {
        self.steps.iter().filter(|s| s.role() == role).count()
    }
}

/// Builds the source and steps of a workflow kind from its configuration.
///
/// Called once per workflow, after the service connection has been resolved.
/// Closures with the matching signature implement this trait.
pub trait StepsBuilder<R: Record>: Send + Sync {
    /// Builds the pipeline.
    fn build(
        &self,
        config: &WorkflowConfig,
        catalog: &Arc<dyn CatalogClient>,
    ) -> Result<Pipeline<R>>;
}

impl<R, F> StepsBuilder<R> for F
where
    R: Record,
    F: Fn(&WorkflowConfig, &Arc<dyn CatalogClient>) -> Result<Pipeline<R>> + Send + Sync,
{
    fn build(
        &self,
        config: &WorkflowConfig,
        catalog: &Arc<dyn CatalogClient>,
    ) -> Result<Pipeline<R>> {
        self(config, catalog)
    }
}

/// Assembles a [`Workflow`].
///
/// # Example
///
/// ```ignore
/// let mut workflow = WorkflowBuilder::new(config, catalog)
///     .kind(WorkflowType::Ingestion)
///     .reporter(reporter)
///     .build(&registry)
///     .await?;
/// let state = workflow.execute().await?;
/// ```
pub struct WorkflowBuilder {
    pub(super) config: WorkflowConfig,
    pub(super) catalog: Arc<dyn CatalogClient>,
    pub(super) kind: WorkflowType,
    pub(super) reporter: Arc<dyn StatusReporter>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) report_interval: Option<Duration>,
}

impl fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("kind", &self.kind)
            .field("source_type", &self.config.source.source_type)
            .field("report_interval", &self.report_interval)
            .finish()
    }
}

impl WorkflowBuilder {
    /// Creates a builder for the given configuration and catalog client.
    #[must_use]
    pub fn new(config: WorkflowConfig, catalog: Arc<dyn CatalogClient>) -> Self {
        Self {
            config,
            catalog,
            kind: WorkflowType::default(),
            reporter: Arc::new(NoOpStatusReporter),
            events: Arc::new(LoggingEventSink::default()),
            report_interval: None,
        }
    }

    /// Sets the workflow kind.
    #[must_use]
    pub fn kind(mut self, kind: WorkflowType) -> Self {
        self.kind = kind;
        self
    }

    /// Sets where pipeline state is reported.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets where progress and summary events go.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Overrides the configured progress report interval.
    ///
    /// A zero interval makes [`build`](Self::build) fail.
    #[must_use]
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Resolves the service connection, builds the steps and reports `running`.
    pub async fn build<R: Record>(self, steps: &dyn StepsBuilder<R>) -> Result<Workflow<R>> {
        Workflow::create(self, steps).await
    }
}
