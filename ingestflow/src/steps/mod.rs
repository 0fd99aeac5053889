//! Step traits and the role-tagged step wrapper.
//!
//! A pipeline is one [`Source`] followed by an ordered list of [`Step`]s.
//! Per-record steps implement [`RecordStep`]; the role they play is declared
//! by the [`Step`] variant they are wrapped in, and the engine dispatches on
//! that variant.

mod adapters;

pub use adapters::{FnStep, StreamSource};

use crate::core::{Record, StepRole};
use crate::errors::{panic_message, StepError};
use crate::status::{FailureRecord, Status};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

/// Per-step execution context handed to every step call.
#[derive(Debug, Clone)]
pub struct StepContext {
    run_id: Uuid,
    status: Arc<Status>,
}

impl StepContext {
    /// Creates a context for one step of a run.
    #[must_use]
    pub fn new(run_id: Uuid, status: Arc<Status>) -> Self {
        Self { run_id, status }
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the name of the step this context belongs to.
    #[must_use]
    pub fn step_name(&self) -> &str {
        self.status.name()
    }

    /// Returns the step's status tracker.
    #[must_use]
    pub fn status(&self) -> &Arc<Status> {
        &self.status
    }

    /// Records a warning against the step without affecting the record's outcome.
    pub fn warning(&self, key: impl Into<String>, message: impl Into<String>) {
        self.status.warning(key, message);
    }
}

/// What a single-record step did with its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// Processed; hand this record to the next step.
    Next(R),
    /// Processed; nothing to hand downstream.
    Consumed,
    /// Skipped by policy; nothing to hand downstream.
    Filtered {
        /// Why the record was skipped.
        reason: String,
    },
}

impl<R> Outcome<R> {
    /// Creates a filtered outcome.
    #[must_use]
    pub fn filtered(reason: impl Into<String>) -> Self {
        Self::Filtered {
            reason: reason.into(),
        }
    }
}

/// One item produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem<R> {
    /// A record to route through the steps.
    Record(R),
    /// An entity skipped by the source's filters.
    Filtered {
        /// Entity key.
        key: String,
        /// Why it was skipped.
        reason: String,
    },
    /// An entity the source failed to extract; the run continues.
    Failed(FailureRecord),
}

/// Produces the record sequence of a run.
///
/// The sequence is lazy, finite and not restartable. Returning `Err` from
/// [`Source::next_record`] aborts the run; per-entity problems should be
/// reported as [`SourceItem::Failed`] instead.
#[async_trait]
pub trait Source<R: Record>: Send {
    /// Returns the name of the source.
    fn name(&self) -> &str;

    /// Pulls the next item, or `None` once the source is exhausted.
    async fn next_record(
        &mut self,
        ctx: &StepContext,
    ) -> Result<Option<SourceItem<R>>, StepError>;

    /// Releases held resources.
    async fn close(&mut self) -> Result<(), StepError> {
        Ok(())
    }
}

/// A step that handles one record at a time: processor, stage or sink.
///
/// Errors and panics are recorded as failures of this step for the record
/// at hand and never abort the run.
#[async_trait]
pub trait RecordStep<R: Record>: Send {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Handles one record.
    async fn run(&mut self, record: R, ctx: &StepContext) -> Result<Outcome<R>, StepError>;

    /// Releases held resources.
    async fn close(&mut self) -> Result<(), StepError> {
        Ok(())
    }
}

/// A terminal step that runs once, after the source is exhausted.
///
/// It reads whatever intermediate state earlier stages left behind and
/// publishes it in one go. An error aborts the run.
#[async_trait]
pub trait BulkSink: Send {
    /// Returns the name of the bulk sink.
    fn name(&self) -> &str;

    /// Publishes the accumulated state.
    async fn run(&mut self, ctx: &StepContext) -> Result<(), StepError>;

    /// Releases held resources.
    async fn close(&mut self) -> Result<(), StepError> {
        Ok(())
    }
}

/// A pipeline step tagged with its role.
pub enum Step<R: Record> {
    /// Transforms one record into one record.
    Processor(Box<dyn RecordStep<R>>),
    /// Transforms or stages one record.
    Stage(Box<dyn RecordStep<R>>),
    /// Consumes one record.
    Sink(Box<dyn RecordStep<R>>),
    /// Consumes the accumulated state once the stream ends.
    BulkSink(Box<dyn BulkSink>),
}

impl<R: Record> std::fmt::Debug for Step<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("role", &self.role())
            .field("name", &self.name())
            .finish()
    }
}

impl<R: Record> Step<R> {
    /// Wraps a processor.
    pub fn processor(step: impl RecordStep<R> + 'static) -> Self {
        Self::Processor(Box::new(step))
    }

    /// Wraps a stage.
    pub fn stage(step: impl RecordStep<R> + 'static) -> Self {
        Self::Stage(Box::new(step))
    }

    /// Wraps a sink.
    pub fn sink(step: impl RecordStep<R> + 'static) -> Self {
        Self::Sink(Box::new(step))
    }

    /// Wraps a bulk sink.
    pub fn bulk_sink(step: impl BulkSink + 'static) -> Self {
        Self::BulkSink(Box::new(step))
    }

    /// Returns the declared role.
    #[must_use]
    pub fn role(&self) -> StepRole {
        match self {
            Self::Processor(_) => StepRole::Processor,
            Self::Stage(_) => StepRole::Stage,
            Self::Sink(_) => StepRole::Sink,
            Self::BulkSink(_) => StepRole::BulkSink,
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Processor(s) | Self::Stage(s) | Self::Sink(s) => s.name(),
            Self::BulkSink(s) => s.name(),
        }
    }

    /// Routes one record through this step and records the outcome.
    ///
    /// Returns the record to hand downstream, or `None` to stop propagation.
    /// A bulk sink lets records pass untouched.
    pub(crate) async fn process(&mut self, record: R, ctx: &StepContext) -> Option<R> {
        let step = match self {
            Self::Processor(s) | Self::Stage(s) | Self::Sink(s) => s,
            Self::BulkSink(_) => return Some(record),
        };

        let key = record.key();
        let status = ctx.status();
        match AssertUnwindSafe(step.run(record, ctx)).catch_unwind().await {
            Ok(Ok(Outcome::Next(next))) => {
                status.scanned(&key);
                Some(next)
            }
            Ok(Ok(Outcome::Consumed)) => {
                status.scanned(&key);
                None
            }
            Ok(Ok(Outcome::Filtered { reason })) => {
                status.filter(key, reason);
                None
            }
            Ok(Err(err)) => {
                status.record_failure(FailureRecord::from_error(key, &err));
                None
            }
            Err(payload) => {
                status.failed(
                    key,
                    format!("step panicked: {}", panic_message(payload.as_ref())),
                    None,
                );
                None
            }
        }
    }

    /// Closes the wrapped step.
    pub async fn close(&mut self) -> Result<(), StepError> {
        match self {
            Self::Processor(s) | Self::Stage(s) | Self::Sink(s) => s.close().await,
            Self::BulkSink(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCounts;
    use anyhow::bail;

    fn ctx(name: &str, role: StepRole) -> StepContext {
        StepContext::new(Uuid::new_v4(), Arc::new(Status::new(name, role)))
    }

    #[derive(Debug)]
    struct Upper;

    #[async_trait]
    impl RecordStep<String> for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn run(
            &mut self,
            record: String,
            _ctx: &StepContext,
        ) -> Result<Outcome<String>, StepError> {
            if record.is_empty() {
                bail!("empty record");
            }
            if record.starts_with('_') {
                return Ok(Outcome::filtered("private"));
            }
            if record == "panic" {
                panic!("bad input");
            }
            Ok(Outcome::Next(record.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_process_records_outcomes() {
        let mut step = Step::processor(Upper);
        let ctx = ctx("upper", StepRole::Processor);

        assert_eq!(step.process("orders".to_string(), &ctx).await.as_deref(), Some("ORDERS"));
        assert_eq!(step.process("_tmp".to_string(), &ctx).await, None);
        assert_eq!(step.process(String::new(), &ctx).await, None);
        assert_eq!(step.process("panic".to_string(), &ctx).await, None);

        assert_eq!(
            ctx.status().counts(),
            StatusCounts {
                scanned: 1,
                filtered: 1,
                warnings: 0,
                failed: 2,
            }
        );
        let snapshot = ctx.status().snapshot();
        assert_eq!(snapshot.failures[0].error, "empty record");
        assert!(snapshot.failures[1].error.contains("bad input"));
    }

    #[tokio::test]
    async fn test_bulk_sink_passes_records_through() {
        struct Noop;

        #[async_trait]
        impl BulkSink for Noop {
            fn name(&self) -> &str {
                "noop"
            }

            async fn run(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
                Ok(())
            }
        }

        let mut step: Step<String> = Step::bulk_sink(Noop);
        let ctx = ctx("noop", StepRole::BulkSink);

        assert_eq!(step.role(), StepRole::BulkSink);
        assert_eq!(step.process("a".to_string(), &ctx).await.as_deref(), Some("a"));
        assert_eq!(ctx.status().counts(), StatusCounts::default());
    }

    #[test]
    fn test_step_debug() {
        let step: Step<String> = Step::sink(Upper);
        let debug = format!("{step:?}");
        assert!(debug.contains("Sink"));
        assert!(debug.contains("upper"));
    }

    #[test]
    fn test_context_warning() {
        let ctx = ctx("sink", StepRole::Sink);
        ctx.warning("db.orders", "no owner");
        assert_eq!(ctx.step_name(), "sink");
        assert_eq!(ctx.status().counts().warnings, 1);
    }
}
