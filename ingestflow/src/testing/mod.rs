//! Testing utilities for ingestflow workflows.
//!
//! This module provides:
//! - Mock sources, steps and bulk sinks with shared call probes
//! - An in-memory catalog and a recording status reporter
//! - Assertions over workflow summaries

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_accounted, assert_no_failures, assert_step_counts};
pub use fixtures::{
    deployed_workflow_config, workflow_config, InMemoryCatalog, PrebuiltSteps, RecordingReporter,
};
pub use mocks::{CallProbe, CloseBehavior, MockBulkSink, MockSource, MockStep, StepAction};
