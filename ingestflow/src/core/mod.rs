//! Core domain model types for ingestflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Pipeline state and step role enums
//! - The record trait

mod record;
mod state;

pub use record::Record;
pub use state::{PipelineState, StepRole};
