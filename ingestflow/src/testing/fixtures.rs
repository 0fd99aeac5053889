//! Test fixtures: an in-memory catalog, a recording reporter and configs.

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::catalog::{CatalogClient, CatalogConfig, ServiceConnection, ServiceEntity, ServiceType};
use crate::config::WorkflowConfig;
use crate::core::{PipelineState, Record};
use crate::errors::{Result, WorkflowError};
use crate::workflow::{Pipeline, PipelineStatusReport, StatusReporter, StepsBuilder};

/// A catalog client backed by a map, counting lookups and closes.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    config: CatalogConfig,
    services: HashMap<(ServiceType, String), ServiceEntity>,
    lookup_error: Option<String>,
    close_error: Option<String>,
    lookups: AtomicUsize,
    closes: AtomicUsize,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a service.
    #[must_use]
    pub fn with_service(mut self, service: ServiceEntity) -> Self {
        self.services
            .insert((service.service_type, service.name.clone()), service);
        self
    }

    /// Stores a database service with a connection of the given type.
    #[must_use]
    pub fn with_database_service(self, name: &str, connection_type: &str) -> Self {
        self.with_service(ServiceEntity {
            name: name.to_string(),
            service_type: ServiceType::Database,
            connection: Some(ServiceConnection::new(
                json!({"config": {"type": connection_type}}),
            )),
        })
    }

    /// Replaces the catalog configuration.
    #[must_use]
    pub fn with_config(mut self, config: CatalogConfig) -> Self {
        self.config = config;
        self
    }

    /// Makes every lookup fail with `message`.
    #[must_use]
    pub fn failing_lookups(mut self, message: impl Into<String>) -> Self {
        self.lookup_error = Some(message.into());
        self
    }

    /// Makes `close` fail with `message`.
    #[must_use]
    pub fn failing_close(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    /// Number of `get_by_name` calls.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalog {
    fn config(&self) -> &CatalogConfig {
        &self.config
    }

    async fn get_by_name(
        &self,
        service_type: ServiceType,
        name: &str,
    ) -> anyhow::Result<Option<ServiceEntity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.lookup_error {
            return Err(anyhow!("{message}"));
        }
        Ok(self.services.get(&(service_type, name.to_string())).cloned())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// A reporter that keeps every report it receives.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<PipelineStatusReport>>,
    error: Option<String>,
}

impl RecordingReporter {
    /// Creates a reporter that accepts every report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reporter that records and then fails every report.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            error: Some(message.into()),
        }
    }

    /// Returns all reports received.
    #[must_use]
    pub fn reports(&self) -> Vec<PipelineStatusReport> {
        self.reports.lock().clone()
    }

    /// Returns the reported states, in order.
    #[must_use]
    pub fn states(&self) -> Vec<PipelineState> {
        self.reports.lock().iter().map(|r| r.state).collect()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, report: &PipelineStatusReport) -> anyhow::Result<()> {
        self.reports.lock().push(report.clone());
        match &self.error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// A steps builder that hands out a pipeline assembled ahead of time.
///
/// Building a second time is an error.
#[derive(Debug)]
pub struct PrebuiltSteps<R: Record> {
    pipeline: Mutex<Option<Pipeline<R>>>,
    builds: AtomicUsize,
}

impl<R: Record> PrebuiltSteps<R> {
    /// Wraps a pipeline.
    #[must_use]
    pub fn new(pipeline: Pipeline<R>) -> Self {
        Self {
            pipeline: Mutex::new(Some(pipeline)),
            builds: AtomicUsize::new(0),
        }
    }

    /// Number of `build` calls.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl<R: Record> StepsBuilder<R> for PrebuiltSteps<R> {
    fn build(
        &self,
        _config: &WorkflowConfig,
        _catalog: &Arc<dyn CatalogClient>,
    ) -> Result<Pipeline<R>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.pipeline
            .lock()
            .take()
            .ok_or_else(|| WorkflowError::InvalidConfig("pipeline was already built".to_string()))
    }
}

/// A database workflow config with an inline connection.
#[must_use]
pub fn workflow_config() -> WorkflowConfig {
    WorkflowConfig::new("mysql", "local_mysql").with_service_connection(ServiceConnection::new(
        json!({"config": {"type": "Mysql", "hostPort": "localhost:3306"}}),
    ))
}

/// A database workflow config deployed as an ingestion pipeline.
#[must_use]
pub fn deployed_workflow_config() -> WorkflowConfig {
    let mut config = workflow_config();
    config.ingestion_pipeline_fqn = Some("local_mysql.metadata_ingestion".to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_catalog_lookup() {
        let catalog = InMemoryCatalog::new().with_database_service("local_mysql", "Mysql");

        let found = catalog
            .get_by_name(ServiceType::Database, "local_mysql")
            .await
            .unwrap();
        let missing = catalog
            .get_by_name(ServiceType::Dashboard, "local_mysql")
            .await
            .unwrap();

        assert_eq!(
            found.and_then(|s| s.connection).unwrap().connection_type(),
            Some("Mysql")
        );
        assert!(missing.is_none());
        assert_eq!(catalog.lookup_count(), 2);
    }

    #[test]
    fn test_in_memory_catalog_close_failure() {
        let catalog = InMemoryCatalog::new().failing_close("already closed");

        tokio_test::assert_err!(tokio_test::block_on(catalog.close()));
        assert_eq!(catalog.close_count(), 1);
    }

    #[test]
    fn test_prebuilt_steps_build_once() {
        let source = crate::testing::MockSource::numbered("s", "t", 1);
        let steps = PrebuiltSteps::new(Pipeline::new(source));
        let catalog: Arc<dyn CatalogClient> = Arc::new(InMemoryCatalog::new());

        assert!(steps.build(&workflow_config(), &catalog).is_ok());
        assert!(steps.build(&workflow_config(), &catalog).is_err());
        assert_eq!(steps.build_count(), 2);
    }

    #[test]
    fn test_fixture_configs_validate() {
        assert!(workflow_config().validate().is_ok());
        assert!(workflow_config().source.has_connection());
        assert!(deployed_workflow_config().ingestion_pipeline_fqn.is_some());
    }
}
