//! Pipeline state and step role enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall outcome of a workflow run, as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    /// The run has been constructed and is executing.
    #[default]
    Running,
    /// Every record was processed without failures.
    Success,
    /// Some records failed, within the configured tolerance.
    PartialSuccess,
    /// Failures exceeded the tolerance, or the run aborted.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partialSuccess"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineState {
    /// Returns true once the state can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if the run is considered successful, fully or partially.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

/// The role a step plays in the pipeline.
///
/// The engine dispatches on the declared role rather than on the concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    /// Produces the record sequence.
    Source,
    /// Transforms one record into one record.
    Processor,
    /// Transforms or stages one record, possibly persisting intermediate state.
    Stage,
    /// Terminal consumer of single records.
    Sink,
    /// Terminal consumer that runs once after the source is exhausted.
    BulkSink,
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Processor => write!(f, "processor"),
            Self::Stage => write!(f, "stage"),
            Self::Sink => write!(f, "sink"),
            Self::BulkSink => write!(f, "bulk_sink"),
        }
    }
}

impl StepRole {
    /// Returns true for roles that receive records one at a time.
    #[must_use]
    pub fn is_per_record(&self) -> bool {
        matches!(self, Self::Processor | Self::Stage | Self::Sink)
    }
}
