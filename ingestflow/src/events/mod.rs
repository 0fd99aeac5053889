//! Event sinks for progress reports.
//!
//! Sinks are passed to the workflow explicitly; there is no process-wide
//! default sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Periodic progress snapshot emitted by the status timer.
pub const PROGRESS_EVENT: &str = "workflow.progress";

/// Final summary emitted when a run stops.
pub const SUMMARY_EVENT: &str = "workflow.summary";
