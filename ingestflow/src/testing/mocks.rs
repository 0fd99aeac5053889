//! Mock sources and steps for testing.
//!
//! Steps are moved into the workflow they run in, so each mock hands out a
//! [`CallProbe`] that keeps observing it afterwards.

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::Record;
use crate::errors::StepError;
use crate::status::FailureRecord;
use crate::steps::{BulkSink, Outcome, RecordStep, Source, SourceItem, StepContext};

/// Shared view of the calls a mock received.
#[derive(Debug, Clone, Default)]
pub struct CallProbe {
    seen: Arc<Mutex<Vec<String>>>,
    runs: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl CallProbe {
    /// Creates an empty probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of the records the mock received, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    /// Returns true if the mock received the record with this key.
    #[must_use]
    pub fn saw(&self, key: &str) -> bool {
        self.seen.lock().iter().any(|k| k == key)
    }

    /// Number of `run` calls; records pulled for a source.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, key: String) {
        self.seen.lock().push(key);
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a mock behaves on `close`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Close succeeds.
    #[default]
    Ok,
    /// Close returns an error.
    Fail(String),
    /// Close panics.
    Panic(String),
}

impl CloseBehavior {
    fn apply(&self) -> Result<(), StepError> {
        match self {
            Self::Ok => Ok(()),
            Self::Fail(message) => Err(anyhow!("{message}")),
            Self::Panic(message) => panic!("{message}"),
        }
    }
}

/// A source that yields a fixed list of items, optionally failing midway.
#[derive(Debug)]
pub struct MockSource<R> {
    name: String,
    items: VecDeque<SourceItem<R>>,
    fail_after: Option<(usize, String)>,
    on_close: CloseBehavior,
    probe: CallProbe,
}

impl<R: Record> MockSource<R> {
    /// Creates a source yielding the given items in order.
    #[must_use]
    pub fn new(name: impl Into<String>, items: Vec<SourceItem<R>>) -> Self {
        Self {
            name: name.into(),
            items: items.into(),
            fail_after: None,
            on_close: CloseBehavior::Ok,
            probe: CallProbe::new(),
        }
    }

    /// Creates a source yielding the given records.
    #[must_use]
    pub fn from_records(name: impl Into<String>, records: impl IntoIterator<Item = R>) -> Self {
        Self::new(name, records.into_iter().map(SourceItem::Record).collect())
    }

    /// Fails with `message` once `count` items have been yielded.
    #[must_use]
    pub fn fail_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Sets the close behavior.
    #[must_use]
    pub fn on_close(mut self, behavior: CloseBehavior) -> Self {
        self.on_close = behavior;
        self
    }

    /// Returns a probe observing this source.
    #[must_use]
    pub fn probe(&self) -> CallProbe {
        self.probe.clone()
    }
}

impl MockSource<String> {
    /// Creates a source yielding one string record per key.
    #[must_use]
    pub fn from_keys<I, K>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::from_records(name, keys.into_iter().map(Into::into))
    }

    /// Creates a source yielding `count` records keyed `{prefix}{i}`.
    #[must_use]
    pub fn numbered(name: impl Into<String>, prefix: &str, count: usize) -> Self {
        Self::from_keys(name, (0..count).map(|i| format!("{prefix}{i}")))
    }
}

#[async_trait]
impl<R: Record> Source<R> for MockSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(
        &mut self,
        _ctx: &StepContext,
    ) -> Result<Option<SourceItem<R>>, StepError> {
        if let Some((count, message)) = &self.fail_after {
            if self.probe.run_count() >= *count {
                return Err(anyhow!("{message}"));
            }
        }
        let item = self.items.pop_front();
        if let Some(item) = &item {
            let key = match item {
                SourceItem::Record(record) => record.key(),
                SourceItem::Filtered { key, .. } => key.clone(),
                SourceItem::Failed(FailureRecord { name, .. }) => name.clone(),
            };
            self.probe.record(key);
        }
        Ok(item)
    }

    async fn close(&mut self) -> Result<(), StepError> {
        self.probe.closed();
        self.on_close.apply()
    }
}

/// What a [`MockStep`] does with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Pass the record downstream.
    Next,
    /// Accept the record and stop propagation.
    Consume,
    /// Filter the record with a reason.
    Filter(String),
    /// Return an error.
    Fail(String),
    /// Panic.
    Panic(String),
}

/// A configurable processor, stage or sink.
#[derive(Debug)]
pub struct MockStep {
    name: String,
    default_action: StepAction,
    actions: HashMap<String, StepAction>,
    on_close: CloseBehavior,
    probe: CallProbe,
}

impl MockStep {
    /// Creates a step applying `action` to every record.
    #[must_use]
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            default_action: action,
            actions: HashMap::new(),
            on_close: CloseBehavior::Ok,
            probe: CallProbe::new(),
        }
    }

    /// Creates a step that passes every record downstream.
    #[must_use]
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self::new(name, StepAction::Next)
    }

    /// Creates a terminal step that accepts every record.
    #[must_use]
    pub fn consuming(name: impl Into<String>) -> Self {
        Self::new(name, StepAction::Consume)
    }

    /// Overrides the action for one record key.
    #[must_use]
    pub fn on(mut self, key: impl Into<String>, action: StepAction) -> Self {
        self.actions.insert(key.into(), action);
        self
    }

    /// Fails every record whose key is listed.
    #[must_use]
    pub fn failing_on<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.actions
                .insert(key.into(), StepAction::Fail("mock failure".to_string()));
        }
        self
    }

    /// Sets the close behavior.
    #[must_use]
    pub fn on_close(mut self, behavior: CloseBehavior) -> Self {
        self.on_close = behavior;
        self
    }

    /// Returns a probe observing this step.
    #[must_use]
    pub fn probe(&self) -> CallProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl<R: Record> RecordStep<R> for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, record: R, _ctx: &StepContext) -> Result<Outcome<R>, StepError> {
        let key = record.key();
        self.probe.record(key.clone());
        match self.actions.get(&key).unwrap_or(&self.default_action) {
            StepAction::Next => Ok(Outcome::Next(record)),
            StepAction::Consume => Ok(Outcome::Consumed),
            StepAction::Filter(reason) => Ok(Outcome::filtered(reason.clone())),
            StepAction::Fail(message) => Err(anyhow!("{message}: {key}")),
            StepAction::Panic(message) => panic!("{message}"),
        }
    }

    async fn close(&mut self) -> Result<(), StepError> {
        self.probe.closed();
        self.on_close.apply()
    }
}

/// A bulk sink that counts its runs and can be told to fail.
#[derive(Debug)]
pub struct MockBulkSink {
    name: String,
    error: Option<String>,
    on_close: CloseBehavior,
    probe: CallProbe,
}

impl MockBulkSink {
    /// Creates a succeeding bulk sink.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: None,
            on_close: CloseBehavior::Ok,
            probe: CallProbe::new(),
        }
    }

    /// Creates a bulk sink whose run fails with `message`.
    #[must_use]
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(name)
        }
    }

    /// Sets the close behavior.
    #[must_use]
    pub fn on_close(mut self, behavior: CloseBehavior) -> Self {
        self.on_close = behavior;
        self
    }

    /// Returns a probe observing this bulk sink.
    #[must_use]
    pub fn probe(&self) -> CallProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl BulkSink for MockBulkSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, ctx: &StepContext) -> Result<(), StepError> {
        self.probe.record(ctx.step_name().to_string());
        match &self.error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), StepError> {
        self.probe.closed();
        self.on_close.apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepRole;
    use crate::status::Status;
    use uuid::Uuid;

    fn ctx(name: &str, role: StepRole) -> StepContext {
        StepContext::new(Uuid::new_v4(), Arc::new(Status::new(name, role)))
    }

    #[tokio::test]
    async fn test_mock_source_fails_after_count() {
        let mut source = MockSource::numbered("tables", "t", 5).fail_after(2, "connection reset");
        let probe = source.probe();
        let ctx = ctx("tables", StepRole::Source);

        assert!(source.next_record(&ctx).await.unwrap().is_some());
        assert!(source.next_record(&ctx).await.unwrap().is_some());
        let err = source.next_record(&ctx).await.unwrap_err();

        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(probe.seen(), vec!["t0", "t1"]);
    }

    #[tokio::test]
    async fn test_mock_step_actions() {
        let mut step = MockStep::passthrough("processor")
            .on("skip", StepAction::Filter("excluded".to_string()))
            .failing_on(["bad"]);
        let probe = step.probe();
        let ctx = ctx("processor", StepRole::Processor);

        let ok: Outcome<String> = step.run("good".to_string(), &ctx).await.unwrap();
        assert_eq!(ok, Outcome::Next("good".to_string()));
        let skipped: Outcome<String> = step.run("skip".to_string(), &ctx).await.unwrap();
        assert_eq!(skipped, Outcome::filtered("excluded"));
        let failed: Result<Outcome<String>, _> = step.run("bad".to_string(), &ctx).await;
        assert_eq!(failed.unwrap_err().to_string(), "mock failure: bad");

        assert_eq!(probe.run_count(), 3);
        assert!(probe.saw("skip"));
    }

    #[tokio::test]
    async fn test_mock_close_behaviors() {
        let mut sink =
            MockBulkSink::new("bulk").on_close(CloseBehavior::Fail("disk full".to_string()));
        let probe = sink.probe();

        assert_eq!(sink.close().await.unwrap_err().to_string(), "disk full");
        assert_eq!(probe.close_count(), 1);
    }
}
