//! The catalog collaborator and the service model it stores.

mod resolver;

pub use crate::config::CatalogConfig;
pub use resolver::{ConnectionResolution, ServiceConnectionResolver};

use crate::errors::{Result, WorkflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of external system a connector ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
    /// Relational databases and warehouses.
    Database,
    /// BI and dashboarding tools.
    Dashboard,
    /// Message brokers.
    Messaging,
    /// Pipeline orchestrators.
    Pipeline,
    /// ML model registries.
    MlModel,
    /// Object storage.
    Storage,
    /// Search engines.
    Search,
    /// Other metadata catalogs.
    Metadata,
}

const DATABASE_SOURCES: &[&str] = &[
    "athena", "azuresql", "bigquery", "clickhouse", "databricks", "datalake", "db2",
    "deltalake", "druid", "dynamodb", "glue", "hive", "impala", "mariadb", "mongodb", "mssql",
    "mysql", "oracle", "pinotdb", "postgres", "presto", "redshift", "salesforce", "singlestore",
    "snowflake", "sqlite", "trino", "vertica",
];
const DASHBOARD_SOURCES: &[&str] = &[
    "domodashboard", "lightdash", "looker", "metabase", "mode", "powerbi", "qliksense",
    "quicksight", "redash", "sigma", "superset", "tableau",
];
const MESSAGING_SOURCES: &[&str] = &["kafka", "kinesis", "redpanda"];
const PIPELINE_SOURCES: &[&str] = &[
    "airbyte", "airflow", "dagster", "databrickspipeline", "dbtcloud", "fivetran", "gluepipeline",
    "nifi", "spline",
];
const ML_MODEL_SOURCES: &[&str] = &["mlflow", "sagemaker"];
const STORAGE_SOURCES: &[&str] = &["adls", "gcs", "s3"];
const SEARCH_SOURCES: &[&str] = &["elasticsearch", "opensearch"];
const METADATA_SOURCES: &[&str] = &["amundsen", "atlas", "openmetadata"];

impl ServiceType {
    /// Infers the service type from a connector type name.
    ///
    /// Usage and lineage variants of a connector share its service type, so
    /// `snowflake-usage` and `bigquerylineage` both map to [`ServiceType::Database`].
    pub fn from_source_type(source_type: &str) -> Result<Self> {
        let normalized = source_type.trim().to_ascii_lowercase();
        let base = ["-usage", "usage", "-lineage", "lineage"]
            .iter()
            .find_map(|suffix| normalized.strip_suffix(suffix))
            .unwrap_or(normalized.as_str());

        let table: [(&[&str], Self); 8] = [
            (DATABASE_SOURCES, Self::Database),
            (DASHBOARD_SOURCES, Self::Dashboard),
            (MESSAGING_SOURCES, Self::Messaging),
            (PIPELINE_SOURCES, Self::Pipeline),
            (ML_MODEL_SOURCES, Self::MlModel),
            (STORAGE_SOURCES, Self::Storage),
            (SEARCH_SOURCES, Self::Search),
            (METADATA_SOURCES, Self::Metadata),
        ];
        table
            .iter()
            .find(|(names, _)| names.contains(&base))
            .map(|(_, service_type)| *service_type)
            .ok_or_else(|| WorkflowError::UnknownSourceType(source_type.to_string()))
    }

    /// Returns the catalog entity type holding services of this kind.
    #[must_use]
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Database => "databaseService",
            Self::Dashboard => "dashboardService",
            Self::Messaging => "messagingService",
            Self::Pipeline => "pipelineService",
            Self::MlModel => "mlmodelService",
            Self::Storage => "storageService",
            Self::Search => "searchService",
            Self::Metadata => "metadataService",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_type())
    }
}

/// Credentials and endpoint of an external system.
///
/// The content is connector-defined. `Debug` output never includes it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConnection(serde_json::Value);

impl ServiceConnection {
    /// Wraps a connection document.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns true for `null` or an empty object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Returns the raw connection document.
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Returns the connection's declared `type`, if any.
    #[must_use]
    pub fn connection_type(&self) -> Option<&str> {
        self.0
            .get("config")
            .unwrap_or(&self.0)
            .get("type")
            .and_then(serde_json::Value::as_str)
    }
}

impl fmt::Debug for ServiceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConnection")
            .field("type", &self.connection_type())
            .finish_non_exhaustive()
    }
}

/// A service as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntity {
    /// Service name.
    pub name: String,
    /// Service type.
    pub service_type: ServiceType,
    /// Stored connection, if the catalog keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ServiceConnection>,
}

/// Client of the metadata catalog.
///
/// The workflow owns one client for the whole run, hands it to the steps
/// that need it, and closes it during teardown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Returns the client's configuration.
    fn config(&self) -> &CatalogConfig;

    /// Looks up a service by type and name.
    async fn get_by_name(
        &self,
        entity_type: ServiceType,
        name: &str,
    ) -> anyhow::Result<Option<ServiceEntity>>;

    /// Releases the client's connections.
    async fn close(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_type_from_source_type() {
        assert_eq!(ServiceType::from_source_type("mysql").unwrap(), ServiceType::Database);
        assert_eq!(ServiceType::from_source_type("Tableau").unwrap(), ServiceType::Dashboard);
        assert_eq!(ServiceType::from_source_type("kafka").unwrap(), ServiceType::Messaging);
        assert_eq!(ServiceType::from_source_type("airflow").unwrap(), ServiceType::Pipeline);
        assert_eq!(ServiceType::from_source_type("mlflow").unwrap(), ServiceType::MlModel);
        assert_eq!(ServiceType::from_source_type("s3").unwrap(), ServiceType::Storage);
    }

    #[test]
    fn test_usage_and_lineage_suffixes() {
        assert_eq!(
            ServiceType::from_source_type("snowflake-usage").unwrap(),
            ServiceType::Database
        );
        assert_eq!(
            ServiceType::from_source_type("bigquery-lineage").unwrap(),
            ServiceType::Database
        );
        assert_eq!(
            ServiceType::from_source_type("redshiftusage").unwrap(),
            ServiceType::Database
        );
    }

    #[test]
    fn test_unknown_source_type() {
        let err = ServiceType::from_source_type("carrier-pigeon").unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownSourceType(ref t) if t == "carrier-pigeon"));
    }

    #[test]
    fn test_entity_type() {
        assert_eq!(ServiceType::Database.entity_type(), "databaseService");
        assert_eq!(ServiceType::Dashboard.to_string(), "dashboardService");
    }

    #[test]
    fn test_connection_is_empty() {
        assert!(ServiceConnection::new(json!(null)).is_empty());
        assert!(ServiceConnection::new(json!({})).is_empty());
        assert!(!ServiceConnection::new(json!({"config": {"type": "Mysql"}})).is_empty());
    }

    #[test]
    fn test_connection_debug_hides_secrets() {
        let conn = ServiceConnection::new(json!({
            "config": {"type": "Mysql", "password": "hunter2"}
        }));
        let debug = format!("{conn:?}");

        assert!(debug.contains("Mysql"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_service_entity_deserialize() {
        let entity: ServiceEntity = serde_json::from_value(json!({
            "name": "local_mysql",
            "serviceType": "database",
            "connection": {"config": {"type": "Mysql"}}
        }))
        .unwrap();

        assert_eq!(entity.service_type, ServiceType::Database);
        assert_eq!(entity.connection.unwrap().connection_type(), Some("Mysql"));
    }
}
