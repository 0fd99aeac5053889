//! Error types for the ingestflow engine.
//!
//! Per-record failures never surface here: they are absorbed into the owning
//! step's [`Status`](crate::status::Status). Everything in [`WorkflowError`] is
//! fatal for the run that produced it.

use crate::core::{PipelineState, StepRole};
use thiserror::Error;

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Error type returned by step implementations.
///
/// Connectors attach context with `anyhow::Context`; the engine converts it into a
/// failure entry or, for structural steps, into a [`WorkflowError`].
pub type StepError = anyhow::Error;

/// Remediation advice attached to a missing service connection.
pub const MISSING_CONNECTION_HINT: &str = "If it exists in the catalog, make sure the \
     ingestion bot token is valid and that the workflow is deployed with the latest one. \
     If this error persists, recreate the token and redeploy the workflow.";

/// The main error type for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow definition could not be parsed or failed validation.
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfig(String),

    /// The source type does not map to a known service type.
    #[error("Unknown source type '{0}': cannot infer the service type")]
    UnknownSourceType(String),

    /// No factory is registered for a configured component.
    #[error("No {role} registered for type '{component_type}'")]
    UnknownComponent {
        /// Role the component was configured for.
        role: StepRole,
        /// The configured component type.
        component_type: String,
    },

    /// The service connection is missing and the catalog has no usable copy.
    #[error("Error getting the service [{service_name}] from the API. {hint}")]
    ServiceConnectionNotFound {
        /// The configured service name.
        service_name: String,
        /// Remediation advice.
        hint: &'static str,
    },

    /// The catalog lookup for the service connection failed unexpectedly.
    #[error(
        "Unknown error getting service connection for service name [{service_name}] \
         using the secrets manager provider [{secrets_manager_provider}]: {source:#}"
    )]
    ServiceLookup {
        /// The configured service name.
        service_name: String,
        /// The catalog's secrets manager provider.
        secrets_manager_provider: String,
        /// The underlying lookup error.
        #[source]
        source: anyhow::Error,
    },

    /// The source failed while producing records.
    #[error("Source '{step}' failed: {source:#}")]
    Source {
        /// The source name.
        step: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The bulk sink failed.
    #[error("Bulk sink '{step}' failed: {source:#}")]
    BulkSink {
        /// The bulk sink name.
        step: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A panic escaped the execution loop.
    #[error("Workflow panicked: {0}")]
    Panicked(String),

    /// `execute` was called on a workflow that already ran.
    #[error("Workflow run {0} was already executed")]
    AlreadyExecuted(String),

    /// `execute` was called after `stop`.
    #[error("Workflow run {0} was stopped before it executed")]
    Stopped(String),

    /// The finished run did not meet its failure tolerance.
    #[error("Workflow finished with state {state}: {failed} of {processed} records failed")]
    ExecutionFailed {
        /// The final state.
        state: PipelineState,
        /// Total failed records across steps.
        failed: u64,
        /// Total processed records across steps.
        processed: u64,
    },

    /// The status timer was misused.
    #[error("{0}")]
    Timer(#[from] TimerError),
}

impl WorkflowError {
    /// Creates a missing service connection error for the given service.
    #[must_use]
    pub fn service_connection_not_found(service_name: impl Into<String>) -> Self {
        Self::ServiceConnectionNotFound {
            service_name: service_name.into(),
            hint: MISSING_CONNECTION_HINT,
        }
    }

    /// Returns true for errors raised while building the workflow.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnknownSourceType(_)
                | Self::UnknownComponent { .. }
                | Self::ServiceConnectionNotFound { .. }
                | Self::ServiceLookup { .. }
        )
    }

    /// Returns true for errors raised by a structural step.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::BulkSink { .. })
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Errors raised by [`RepeatedTimer`](crate::timer::RepeatedTimer) misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    /// `start` was called more than once.
    #[error("Timer '{0}' was already started")]
    AlreadyStarted(String),

    /// The timer was given a zero interval.
    #[error("Timer '{0}' needs a non-zero interval")]
    ZeroInterval(String),

    /// The background thread could not be spawned.
    #[error("Timer '{name}' could not spawn its thread: {reason}")]
    SpawnFailed {
        /// The timer name.
        name: String,
        /// The OS error.
        reason: String,
    },
}

/// Renders a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
