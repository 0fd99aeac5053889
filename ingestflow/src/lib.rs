//! # Ingestflow
//!
//! The workflow execution core of a metadata ingestion framework.
//!
//! A workflow pulls records from one source and routes each through an
//! ordered chain of processors, stages and sinks, then hands the accumulated
//! state to an optional bulk sink. It provides:
//!
//! - **Per-record error isolation**: a failing record becomes a status entry, not an aborted run
//! - **Status tracking**: per-step counters aggregated into success, partial success or failure
//! - **Progress reporting**: a background timer emitting live counters
//! - **Connection resolution**: missing service credentials filled from the catalog
//! - **Guaranteed cleanup**: every step closed exactly once, whatever happened
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ingestflow::prelude::*;
//!
//! let config = WorkflowConfig::from_json_str(&raw)?;
//! let mut workflow = WorkflowBuilder::new(config, catalog)
//!     .kind(WorkflowType::Ingestion)
//!     .build(&registry)
//!     .await?;
//!
//! let state = workflow.execute().await?;
//! workflow.raise_from_status()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod catalog;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod status;
pub mod steps;
pub mod testing;
pub mod timer;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{
        CatalogClient, CatalogConfig, ServiceConnection, ServiceEntity, ServiceType,
    };
    pub use crate::config::{ComponentConfig, LogLevel, SourceConfig, WorkflowConfig};
    pub use crate::core::{PipelineState, Record, StepRole};
    pub use crate::errors::{Result, StepError, WorkflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_logging;
    pub use crate::status::{FailureRecord, FailureTolerance, Status, WorkflowSummary};
    pub use crate::steps::{
        BulkSink, FnStep, Outcome, RecordStep, Source, SourceItem, Step, StepContext,
        StreamSource,
    };
    pub use crate::timer::RepeatedTimer;
    pub use crate::workflow::{
        LoggingStatusReporter, Pipeline, StatusReporter, StepRegistry, StepsBuilder, Workflow,
        WorkflowBuilder, WorkflowType,
    };
}
