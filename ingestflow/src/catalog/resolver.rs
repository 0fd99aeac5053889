//! Fills in a missing service connection from the catalog.

use super::{CatalogClient, ServiceType};
use crate::config::SourceConfig;
use crate::errors::{Result, WorkflowError};
use tracing::{debug, error, info};

/// What the resolver did with the source configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResolution {
    /// The configuration already carried a connection; the catalog was not contacted.
    AlreadyProvided,
    /// The catalog forbids overriding entities; the connection was left empty.
    OverwriteForced,
    /// The connection was copied from the catalog's stored service.
    FromCatalog,
}

/// Resolves the source's service connection against the catalog.
///
/// Runs once, before any step is built. The copied connection lives only in
/// the in-memory configuration and is never written back.
#[derive(Clone, Copy)]
pub struct ServiceConnectionResolver<'a> {
    catalog: &'a dyn CatalogClient,
}

impl std::fmt::Debug for ServiceConnectionResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConnectionResolver")
            .field("host_port", &self.catalog.config().host_port)
            .finish()
    }
}

impl<'a> ServiceConnectionResolver<'a> {
    /// Creates a resolver backed by the given catalog client.
    #[must_use]
    pub fn new(catalog: &'a dyn CatalogClient) -> Self {
        Self { catalog }
    }

    /// Fills `source.service_connection` from the catalog if it is empty.
    ///
    /// A configured connection always wins over the stored one. A missing
    /// service, or one without a stored connection, fails with
    /// [`WorkflowError::ServiceConnectionNotFound`]; any other lookup error
    /// fails with [`WorkflowError::ServiceLookup`].
    pub async fn resolve(
        &self,
        source: &mut SourceConfig,
        service_type: ServiceType,
    ) -> Result<ConnectionResolution> {
        if source.has_connection() {
            debug!(service = %source.service_name, "Using the configured service connection");
            return Ok(ConnectionResolution::AlreadyProvided);
        }
        let config = self.catalog.config();
        if config.force_entity_overwriting {
            debug!(
                service = %source.service_name,
                "Entity overwriting is forced, not reading the connection from the catalog"
            );
            return Ok(ConnectionResolution::OverwriteForced);
        }

        let service_name = source.service_name.clone();
        let service = match self.catalog.get_by_name(service_type, &service_name).await {
            Ok(service) => service,
            Err(err) => {
                debug!(error = ?err, "Service lookup failed");
                error!(
                    service = %service_name,
                    secrets_manager_provider = %config.secrets_manager_provider,
                    "Unknown error getting service connection: {err:#}"
                );
                return Err(WorkflowError::ServiceLookup {
                    service_name,
                    secrets_manager_provider: config.secrets_manager_provider.clone(),
                    source: err,
                });
            }
        };

        match service.and_then(|s| s.connection).filter(|c| !c.is_empty()) {
            Some(connection) => {
                info!(
                    service = %service_name,
                    service_type = %service_type,
                    "Using the service connection stored in the catalog"
                );
                source.service_connection = Some(connection);
                Ok(ConnectionResolution::FromCatalog)
            }
            None => Err(WorkflowError::service_connection_not_found(service_name)),
        }
    }
}
