//! Ready-made step implementations.

use super::{Outcome, RecordStep, Source, SourceItem, StepContext};
use crate::core::Record;
use crate::errors::StepError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt::Debug;

/// A source backed by a stream of items.
pub struct StreamSource<R> {
    name: String,
    items: BoxStream<'static, Result<SourceItem<R>, StepError>>,
}

impl<R: Record> StreamSource<R> {
    /// Creates a source from a stream of items.
    pub fn new(
        name: impl Into<String>,
        items: impl futures::Stream<Item = Result<SourceItem<R>, StepError>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            items: items.boxed(),
        }
    }

    /// Creates a source that yields the given records in order.
    pub fn from_records<I>(name: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        I::IntoIter: Send + 'static,
    {
        Self::new(name, stream::iter(records.into_iter().map(|r| Ok(SourceItem::Record(r)))))
    }
}

impl<R> Debug for StreamSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<R: Record> Source<R> for StreamSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_record(
        &mut self,
        _ctx: &StepContext,
    ) -> Result<Option<SourceItem<R>>, StepError> {
        self.items.next().await.transpose()
    }
}

/// A function-based record step.
pub struct FnStep<F> {
    name: String,
    func: F,
}

impl<F> FnStep<F> {
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<R, F> RecordStep<R> for FnStep<F>
where
    R: Record,
    F: FnMut(R, &StepContext) -> Result<Outcome<R>, StepError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, record: R, ctx: &StepContext) -> Result<Outcome<R>, StepError> {
        (self.func)(record, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepRole;
    use crate::status::Status;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx() -> StepContext {
        StepContext::new(Uuid::new_v4(), Arc::new(Status::new("test", StepRole::Source)))
    }

    #[tokio::test]
    async fn test_stream_source_yields_in_order() {
        let mut source =
            StreamSource::from_records("tables", vec!["a".to_string(), "b".to_string()]);
        let ctx = ctx();

        assert_eq!(source.name(), "tables");
        assert_eq!(
            source.next_record(&ctx).await.unwrap(),
            Some(SourceItem::Record("a".to_string()))
        );
        assert_eq!(
            source.next_record(&ctx).await.unwrap(),
            Some(SourceItem::Record("b".to_string()))
        );
        assert_eq!(source.next_record(&ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_source_propagates_errors() {
        let items = stream::iter(vec![
            Ok(SourceItem::Record("a".to_string())),
            Err(anyhow::anyhow!("connection reset")),
        ]);
        let mut source = StreamSource::new("flaky", items);
        let ctx = ctx();

        assert!(source.next_record(&ctx).await.is_ok());
        let err = source.next_record(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_fn_step() {
        let mut step = FnStep::new(
            "suffix",
            |record: String, _ctx: &StepContext| -> Result<Outcome<String>, StepError> {
                Ok(Outcome::Next(format!("{record}_v2")))
            },
        );

        assert_eq!(RecordStep::<String>::name(&step), "suffix");
        let out = step.run("orders".to_string(), &ctx()).await.unwrap();
        assert_eq!(out, Outcome::Next("orders_v2".to_string()));
    }
}
