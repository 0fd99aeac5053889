//! Aggregation of step statuses into a run outcome.

use super::{FailureRecord, StatusCounts, StatusSnapshot};
use crate::core::PipelineState;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// How many failed records a run may tolerate before it is marked failed.
///
/// The tolerance is a percentage of processed records. Any failure at all
/// rules out `success`; a pooled failure ratio at or below the tolerance
/// yields `partial_success`, above it `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureTolerance {
    /// Maximum tolerated failure percentage, in `[0, 100]`.
    pub max_failure_percent: f64,
}

impl FailureTolerance {
    /// Creates a tolerance of the given percentage, clamped to `[0, 100]`.
    #[must_use]
    pub fn new(max_failure_percent: f64) -> Self {
        Self {
            max_failure_percent: max_failure_percent.clamp(0.0, 100.0),
        }
    }

    /// A tolerance that marks any failure as a failed run.
    #[must_use]
    pub fn strict() -> Self {
        Self::new(0.0)
    }

    /// Chooses the final state for the given totals.
    #[must_use]
    pub fn evaluate(&self, failed: u64, processed: u64) -> PipelineState {
        if failed == 0 {
            return PipelineState::Success;
        }
        let failure_percent = failed as f64 * 100.0 / processed.max(failed) as f64;
        if failure_percent <= self.max_failure_percent {
            PipelineState::PartialSuccess
        } else {
            PipelineState::Failed
        }
    }
}

/// Status of every step of a run, in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Per-step snapshots, source first.
    pub steps: Vec<StatusSnapshot>,
}

impl WorkflowSummary {
    /// Creates a summary from step snapshots.
    #[must_use]
    pub fn new(steps: Vec<StatusSnapshot>) -> Self {
        Self { steps }
    }

    /// Counters summed over all steps, each step weighted equally per record.
    #[must_use]
    pub fn totals(&self) -> StatusCounts {
        self.steps
            .iter()
            .fold(StatusCounts::default(), |acc, step| acc + step.counts)
    }

    /// Pooled failure ratio across all steps.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        self.totals().failure_ratio()
    }

    /// Returns true if any step recorded a failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| s.counts.failed > 0)
    }

    /// All failure entries, tagged with the step that recorded them.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureRecord)> {
        self.steps
            .iter()
            .flat_map(|s| s.failures.iter().map(move |f| (s.name.as_str(), f)))
    }

    /// Looks up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StatusSnapshot> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Chooses the final state under the given tolerance.
    #[must_use]
    pub fn compute_state(&self, tolerance: &FailureTolerance) -> PipelineState {
        let totals = self.totals();
        tolerance.evaluate(totals.failed, totals.processed())
    }

    /// Renders a human-readable report of the run.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let c = step.counts;
            let _ = writeln!(
                out,
                "{} ({}): scanned={} filtered={} warnings={} failed={} failure_ratio={:.2}%",
                step.name,
                step.role,
                c.scanned,
                c.filtered,
                c.warnings,
                c.failed,
                c.failure_ratio() * 100.0
            );
        }
        let totals = self.totals();
        let _ = write!(
            out,
            "Total: processed={} failed={} failure_ratio={:.2}%",
            totals.processed(),
            totals.failed,
            totals.failure_ratio() * 100.0
        );
        out
    }
}
