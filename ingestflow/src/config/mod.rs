//! Workflow configuration.
//!
//! A workflow is described by a JSON document with camelCase keys. Parsing
//! is all-or-nothing: a document that does not deserialize or validate is a
//! configuration error and the workflow never starts.

use crate::catalog::ServiceConnection;
use crate::errors::{Result, WorkflowError};
use crate::status::FailureTolerance;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Logger verbosity for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Returns the `tracing` filter directive for this level.
    #[must_use]
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Connection settings for the metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    /// Catalog API endpoint.
    #[serde(default = "default_host_port")]
    pub host_port: String,
    /// When set, the catalog must not be used to fill in missing connections.
    #[serde(default)]
    pub force_entity_overwriting: bool,
    /// Where the catalog keeps service secrets.
    #[serde(default = "default_secrets_manager_provider")]
    pub secrets_manager_provider: String,
}

fn default_host_port() -> String {
    "http://localhost:8585/api".to_string()
}

fn default_secrets_manager_provider() -> String {
    "db".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            host_port: default_host_port(),
            force_entity_overwriting: false,
            secrets_manager_provider: default_secrets_manager_provider(),
        }
    }
}

/// The source section of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Connector type, e.g. `mysql` or `tableau`.
    #[serde(rename = "type")]
    pub source_type: String,
    /// Name of the service in the catalog.
    pub service_name: String,
    /// Credentials and endpoint of the external system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_connection: Option<ServiceConnection>,
    /// Connector-specific extraction settings.
    #[serde(default)]
    pub source_config: serde_json::Value,
}

impl SourceConfig {
    /// Returns true if a non-empty connection is configured.
    #[must_use]
    pub fn has_connection(&self) -> bool {
        self.service_connection
            .as_ref()
            .is_some_and(|c| !c.is_empty())
    }
}

/// A processor, stage, sink or bulk sink section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Component type, used to look up its factory.
    #[serde(rename = "type")]
    pub component_type: String,
    /// Component-specific settings.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ComponentConfig {
    /// Creates a component section with empty settings.
    #[must_use]
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            config: serde_json::Value::Null,
        }
    }
}

/// Engine-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Logger verbosity.
    #[serde(default)]
    pub logger_level: LogLevel,
    /// Catalog connection.
    #[serde(default, rename = "openMetadataServerConfig")]
    pub catalog: CatalogConfig,
    /// Tolerated failure percentage before a run is marked failed.
    #[serde(default)]
    pub failure_tolerance: f64,
    /// Seconds between progress reports.
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
}

fn default_report_interval() -> u64 {
    60
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            logger_level: LogLevel::default(),
            catalog: CatalogConfig::default(),
            failure_tolerance: 0.0,
            report_interval_seconds: default_report_interval(),
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// The source section.
    pub source: SourceConfig,
    /// Optional processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<ComponentConfig>,
    /// Optional stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<ComponentConfig>,
    /// Optional sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<ComponentConfig>,
    /// Optional bulk sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_sink: Option<ComponentConfig>,
    /// Engine settings.
    #[serde(default)]
    pub workflow_config: WorkflowSettings,
    /// Run identifier supplied by the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_run_id: Option<Uuid>,
    /// Fully qualified name of the deployed ingestion pipeline.
    #[serde(
        default,
        rename = "ingestionPipelineFQN",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingestion_pipeline_fqn: Option<String>,
}

impl WorkflowConfig {
    /// Creates a minimal configuration for a source.
    #[must_use]
    pub fn new(source_type: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            source: SourceConfig {
                source_type: source_type.into(),
                service_name: service_name.into(),
                service_connection: None,
                source_config: serde_json::Value::Null,
            },
            processor: None,
            stage: None,
            sink: None,
            bulk_sink: None,
            workflow_config: WorkflowSettings::default(),
            pipeline_run_id: None,
            ingestion_pipeline_fqn: None,
        }
    }

    /// Parses and validates a workflow definition.
    pub fn parse(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a workflow definition from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.source.source_type.trim().is_empty() {
            return Err(WorkflowError::InvalidConfig(
                "source.type must not be empty".to_string(),
            ));
        }
        if self.source.service_name.trim().is_empty() {
            return Err(WorkflowError::InvalidConfig(
                "source.serviceName must not be empty".to_string(),
            ));
        }
        let tolerance = self.workflow_config.failure_tolerance;
        if !(0.0..=100.0).contains(&tolerance) {
            return Err(WorkflowError::InvalidConfig(format!(
                "workflowConfig.failureTolerance must be a percentage in [0, 100], got {tolerance}"
            )));
        }
        if self.workflow_config.report_interval_seconds == 0 {
            return Err(WorkflowError::InvalidConfig(
                "workflowConfig.reportIntervalSeconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the service connection.
    #[must_use]
    pub fn with_service_connection(mut self, connection: ServiceConnection) -> Self {
        self.source.service_connection = Some(connection);
        self
    }

    /// Sets the failure tolerance percentage.
    #[must_use]
    pub fn with_failure_tolerance(mut self, percent: f64) -> Self {
        self.workflow_config.failure_tolerance = percent;
        self
    }

    /// Returns the failure tolerance policy.
    #[must_use]
    pub fn failure_tolerance(&self) -> FailureTolerance {
        FailureTolerance::new(self.workflow_config.failure_tolerance)
    }

    /// Returns the interval between progress reports.
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.workflow_config.report_interval_seconds)
    }
}
