//! Status tracking for workflow steps.
//!
//! Every step owns one [`Status`]; at the end of a run the statuses are
//! aggregated into a [`WorkflowSummary`] and judged against a
//! [`FailureTolerance`].

mod summary;
mod tracker;

pub use summary::{FailureTolerance, WorkflowSummary};
pub use tracker::{
    FailureRecord, FilteredRecord, Status, StatusCounts, StatusSnapshot, WarningRecord,
};
