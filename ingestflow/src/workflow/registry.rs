//! Registry of step factories keyed by component type.

use super::builder::{Pipeline, StepsBuilder};
use crate::catalog::CatalogClient;
use crate::config::{ComponentConfig, WorkflowConfig};
use crate::core::{Record, StepRole};
use crate::errors::{Result, WorkflowError};
use crate::steps::{BulkSink, RecordStep, Source, Step};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Factory function type for sources.
pub type SourceFactory<R> = Box<
    dyn Fn(&WorkflowConfig, &Arc<dyn CatalogClient>) -> Result<Box<dyn Source<R>>> + Send + Sync,
>;

/// Factory function type for processors, stages and sinks.
pub type RecordStepFactory<R> =
    Box<dyn Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn RecordStep<R>>> + Send + Sync>;

/// Factory function type for bulk sinks.
pub type BulkSinkFactory =
    Box<dyn Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn BulkSink>> + Send + Sync>;

type Wrap<R> = fn(Box<dyn RecordStep<R>>) -> Step<R>;

/// Builds pipelines from the component types named in a configuration.
///
/// Registration is explicit and owned by the caller; there is no process-wide
/// registry. Components are built in the order source, processor, stage,
/// sink, bulk sink.
pub struct StepRegistry<R: Record> {
    sources: HashMap<String, SourceFactory<R>>,
    record_steps: HashMap<(StepRole, String), RecordStepFactory<R>>,
    bulk_sinks: HashMap<String, BulkSinkFactory>,
}

impl<R: Record> Default for StepRegistry<R> {
    fn default() -> Self {
        Self {
            sources: HashMap::new(),
            record_steps: HashMap::new(),
            bulk_sinks: HashMap::new(),
        }
    }
}

impl<R: Record> fmt::Debug for StepRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps: Vec<String> = self
            .record_steps
            .keys()
            .map(|(role, name)| format!("{role}:{name}"))
            .collect();
        steps.sort();
        f.debug_struct("StepRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("steps", &steps)
            .field("bulk_sinks", &self.bulk_sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<R: Record> StepRegistry<R> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source factory for a `source.type`.
    pub fn register_source<F>(&mut self, source_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&WorkflowConfig, &Arc<dyn CatalogClient>) -> Result<Box<dyn Source<R>>>
            + Send
            + Sync
            + 'static,
    {
        self.sources.insert(source_type.into(), Box::new(factory));
        self
    }

    /// Registers a processor factory.
    pub fn register_processor<F>(
        &mut self,
        component_type: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn RecordStep<R>>>
            + Send
            + Sync
            + 'static,
    {
        self.register_record_step(StepRole::Processor, component_type.into(), Box::new(factory))
    }

    /// Registers a stage factory.
    pub fn register_stage<F>(&mut self, component_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn RecordStep<R>>>
            + Send
            + Sync
            + 'static,
    {
        self.register_record_step(StepRole::Stage, component_type.into(), Box::new(factory))
    }

    /// Registers a sink factory.
    pub fn register_sink<F>(&mut self, component_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn RecordStep<R>>>
            + Send
            + Sync
            + 'static,
    {
        self.register_record_step(StepRole::Sink, component_type.into(), Box::new(factory))
    }

    /// Registers a bulk sink factory.
    pub fn register_bulk_sink<F>(
        &mut self,
        component_type: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&ComponentConfig, &WorkflowConfig) -> Result<Box<dyn BulkSink>>
            + Send
            + Sync
            + 'static,
    {
        self.bulk_sinks.insert(component_type.into(), Box::new(factory));
        self
    }

    fn register_record_step(
        &mut self,
        role: StepRole,
        component_type: String,
        factory: RecordStepFactory<R>,
    ) -> &mut Self {
        self.record_steps.insert((role, component_type), factory);
        self
    }

    /// Returns true if a source is registered for the type.
    #[must_use]
    pub fn has_source(&self, source_type: &str) -> bool {
        self.sources.contains_key(source_type)
    }

    /// Returns true if a component is registered for the role and type.
    #[must_use]
    pub fn has_component(&self, role: StepRole, component_type: &str) -> bool {
        match role {
            StepRole::Source => self.has_source(component_type),
            StepRole::BulkSink => self.bulk_sinks.contains_key(component_type),
            _ => self
                .record_steps
                .contains_key(&(role, component_type.to_string())),
        }
    }
}

fn unknown(role: StepRole, component_type: &str) -> WorkflowError {
    WorkflowError::UnknownComponent {
        role,
        component_type: component_type.to_string(),
    }
}

impl<R: Record> StepsBuilder<R> for StepRegistry<R> {
    fn build(
        &self,
        config: &WorkflowConfig,
        catalog: &Arc<dyn CatalogClient>,
    ) -> Result<Pipeline<R>> {
        let source_type = config.source.source_type.as_str();
        let source_factory = self
            .sources
            .get(source_type)
            .ok_or_else(|| unknown(StepRole::Source, source_type))?;
        let mut pipeline = Pipeline::from_boxed(source_factory(config, catalog)?);

        let record_steps: [(StepRole, &Option<ComponentConfig>, Wrap<R>); 3] = [
            (StepRole::Processor, &config.processor, Step::Processor),
            (StepRole::Stage, &config.stage, Step::Stage),
            (StepRole::Sink, &config.sink, Step::Sink),
        ];
        for (role, component, wrap) in record_steps {
            let Some(component) = component else { continue };
            let factory = self
                .record_steps
                .get(&(role, component.component_type.clone()))
                .ok_or_else(|| unknown(role, &component.component_type))?;
            pipeline.push(wrap(factory(component, config)?));
        }

        if let Some(component) = &config.bulk_sink {
            let factory = self
                .bulk_sinks
                .get(&component.component_type)
                .ok_or_else(|| unknown(StepRole::BulkSink, &component.component_type))?;
            pipeline.push(Step::BulkSink(factory(component, config)?));
        }

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryCatalog, MockBulkSink, MockSource, MockStep};
    use pretty_assertions::assert_eq;

    fn registry() -> StepRegistry<String> {
        let mut registry = StepRegistry::new();
        registry
            .register_source(
                "mysql",
                |config: &WorkflowConfig, _catalog: &Arc<dyn CatalogClient>| {
                    let source: Box<dyn Source<String>> =
                        Box::new(MockSource::from_keys(&config.source.service_name, ["a", "b"]));
                    Ok(source)
                },
            )
            .register_processor("upper", |component: &ComponentConfig, _: &WorkflowConfig| {
                let step: Box<dyn RecordStep<String>> =
                    Box::new(MockStep::passthrough(&component.component_type));
                Ok(step)
            })
            .register_sink(
                "metadata-rest",
                |component: &ComponentConfig, _config: &WorkflowConfig| {
                    let step: Box<dyn RecordStep<String>> =
                        Box::new(MockStep::consuming(&component.component_type));
                    Ok(step)
                },
            )
            .register_bulk_sink(
                "metadata-usage",
                |component: &ComponentConfig, _config: &WorkflowConfig| {
                    let sink: Box<dyn BulkSink> =
                        Box::new(MockBulkSink::new(&component.component_type));
                    Ok(sink)
                },
            );
        registry
    }

    fn catalog() -> Arc<dyn CatalogClient> {
        Arc::new(InMemoryCatalog::new())
    }

    #[test]
    fn test_builds_components_in_order() {
        let mut config = WorkflowConfig::new("mysql", "local_mysql");
        config.bulk_sink = Some(ComponentConfig::new("metadata-usage"));
        config.sink = Some(ComponentConfig::new("metadata-rest"));
        config.processor = Some(ComponentConfig::new("upper"));

        let pipeline = registry().build(&config, &catalog()).unwrap();

        assert_eq!(pipeline.source.name(), "local_mysql");
        let roles: Vec<StepRole> = pipeline.steps.iter().map(Step::role).collect();
        assert_eq!(
            roles,
            vec![StepRole::Processor, StepRole::Sink, StepRole::BulkSink]
        );
        let names: Vec<&str> = pipeline.steps.iter().map(Step::name).collect();
        assert_eq!(names, vec!["upper", "metadata-rest", "metadata-usage"]);
    }

    #[test]
    fn test_unknown_source_type() {
        let config = WorkflowConfig::new("postgres", "pg");
        let err = registry().build(&config, &catalog()).unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::UnknownComponent {
                role: StepRole::Source,
                ref component_type,
            } if component_type == "postgres"
        ));
    }

    #[test]
    fn test_component_registered_for_another_role() {
        let mut config = WorkflowConfig::new("mysql", "local_mysql");
        config.stage = Some(ComponentConfig::new("upper"));

        let err = registry().build(&config, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "No stage registered for type 'upper'");
    }

    #[test]
    fn test_has_component() {
        let registry = registry();
        assert!(registry.has_source("mysql"));
        assert!(registry.has_component(StepRole::Processor, "upper"));
        assert!(!registry.has_component(StepRole::Stage, "upper"));
        assert!(registry.has_component(StepRole::BulkSink, "metadata-usage"));
    }
}
