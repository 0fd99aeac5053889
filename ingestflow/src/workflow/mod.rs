//! Workflow construction and execution.
//!
//! This module provides:
//! - The [`Workflow`] engine and its [`WorkflowBuilder`]
//! - [`StepsBuilder`] and the explicit [`StepRegistry`] of step factories
//! - Pipeline status reporting for external orchestration

mod builder;
mod engine;
mod registry;
mod reporting;


pub use builder::{Pipeline, StepsBuilder, WorkflowBuilder, WorkflowType};
pub use engine::Workflow;
pub use registry::{BulkSinkFactory, RecordStepFactory, SourceFactory, StepRegistry};
pub use reporting::{
    LoggingStatusReporter, NoOpStatusReporter, PipelineStatusReport, StatusReporter,
};
