use super::collection::{CollectionRequest, Market};
use super::credential::AccessGrant;
use super::status::ProviderResponse;
use super::variables::{CompletionVariables, PendingVariables};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// The mobile-money provider's HTTP API.
///
/// Transport failures (timeouts, refused connections) surface as
/// `ConnectorError::ProviderUnavailable`; any answer the provider does give,
/// successful or not, comes back as a [`ProviderResponse`].
#[async_trait]
pub trait CollectionProvider: Send + Sync {
    async fn authenticate(&self) -> Result<AccessGrant>;
    async fn initiate_collection(
        &self,
        token: &str,
        request: &CollectionRequest,
    ) -> Result<ProviderResponse>;
    async fn transaction_status(
        &self,
        token: &str,
        transaction_id: &str,
        market: &Market,
    ) -> Result<ProviderResponse>;
}

/// A terminal message correlated to a waiting process instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionMessage {
    pub name: String,
    pub correlation_key: String,
    pub time_to_live: Duration,
    pub variables: CompletionVariables,
}

/// Messaging side of the workflow engine.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Publishes and waits for the broker's acknowledgement. An unknown
    /// correlation key is reported as `ConnectorError::UnknownCorrelation`.
    async fn publish_message(&self, message: &CompletionMessage) -> Result<()>;
    async fn set_variables(
        &self,
        element_instance_key: &str,
        variables: &PendingVariables,
    ) -> Result<()>;
}

/// A unit of work handed out by the workflow engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivatedJob {
    pub key: String,
    pub job_type: String,
    pub process_id: String,
    pub element_instance_key: String,
    pub variables: Map<String, Value>,
}

/// Job side of the workflow engine.
#[async_trait]
pub trait JobClient: Send + Sync {
    async fn activate_jobs(&self, job_type: &str, max_jobs: u32) -> Result<Vec<ActivatedJob>>;
    async fn complete_job(&self, job_key: &str, variables: Value) -> Result<()>;
    /// Fails a job. With no retries left the orchestrator raises an incident.
    async fn fail_job(&self, job_key: &str, retries: u32, message: &str) -> Result<()>;
}

pub type ProviderRef = Arc<dyn CollectionProvider>;
pub type OrchestratorRef = Arc<dyn Orchestrator>;
pub type JobClientRef = Arc<dyn JobClient>;
