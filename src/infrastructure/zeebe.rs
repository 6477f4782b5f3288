//! Camunda 8 / Zeebe REST gateway client.
//!
//! Only the four calls the connector needs: publish a message, set variables on
//! an element instance, activate jobs, complete a job.

use crate::domain::ports::{ActivatedJob, CompletionMessage, JobClient, Orchestrator};
use crate::domain::variables::PendingVariables;
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ZeebeSettings {
    pub rest_url: String,
    pub worker_name: String,
    /// How long an activated job stays locked to this worker.
    pub job_timeout: Duration,
    pub request_timeout: Duration,
}

pub struct ZeebeClient {
    http: Client,
    settings: ZeebeSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a, V: Serialize> {
    name: &'a str,
    correlation_key: &'a str,
    time_to_live: u64,
    variables: &'a V,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivationRequest<'a> {
    #[serde(rename = "type")]
    job_type: &'a str,
    worker: &'a str,
    timeout: u64,
    max_jobs_to_activate: u32,
}

#[derive(Deserialize)]
struct ActivationResponse {
    #[serde(default)]
    jobs: Vec<RawJob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJob {
    #[serde(deserialize_with = "key_string")]
    job_key: String,
    #[serde(rename = "type")]
    job_type: String,
    #[serde(default)]
    process_definition_id: String,
    #[serde(deserialize_with = "key_string")]
    element_instance_key: String,
    #[serde(default)]
    variables: Map<String, Value>,
}

/// Gateways before 8.7 send keys as numbers, later ones as strings.
fn key_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a key, found {}",
            other
        ))),
    }
}

impl From<RawJob> for ActivatedJob {
    fn from(raw: RawJob) -> Self {
        ActivatedJob {
            key: raw.job_key,
            job_type: raw.job_type,
            process_id: raw.process_definition_id,
            element_instance_key: raw.element_instance_key,
            variables: raw.variables,
        }
    }
}

impl ZeebeClient {
    pub fn new(settings: ZeebeSettings) -> Result<Self> {
        let http = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2{}", self.settings.rest_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConnectorError::Orchestrator(format!(
            "{} failed with {}: {}",
            what, status, body
        )))
    }
}

#[async_trait]
impl Orchestrator for ZeebeClient {
    async fn publish_message(&self, message: &CompletionMessage) -> Result<()> {
        let body = PublishRequest {
            name: &message.name,
            correlation_key: &message.correlation_key,
            time_to_live: message.time_to_live.as_millis() as u64,
            variables: &message.variables,
        };
        debug!(correlation_key = %message.correlation_key, "Publishing message");
        let response = self
            .http
            .post(self.url("/messages/publication"))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ConnectorError::UnknownCorrelation(
                message.correlation_key.clone(),
            ));
        }
        Self::check(response, "message publication").await?;
        Ok(())
    }

    async fn set_variables(
        &self,
        element_instance_key: &str,
        variables: &PendingVariables,
    ) -> Result<()> {
        let response = self
            .http
            .put(self.url(&format!(
                "/element-instances/{}/variables",
                element_instance_key
            )))
            .json(&json!({ "variables": variables, "local": false }))
            .send()
            .await?;
        Self::check(response, "variable update").await?;
        Ok(())
    }
}

#[async_trait]
impl JobClient for ZeebeClient {
    async fn activate_jobs(&self, job_type: &str, max_jobs: u32) -> Result<Vec<ActivatedJob>> {
        let body = ActivationRequest {
            job_type,
            worker: &self.settings.worker_name,
            timeout: self.settings.job_timeout.as_millis() as u64,
            max_jobs_to_activate: max_jobs,
        };
        let response = self
            .http
            .post(self.url("/jobs/activation"))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "job activation").await?;
        let activated: ActivationResponse = response.json().await?;
        Ok(activated.jobs.into_iter().map(ActivatedJob::from).collect())
    }

    async fn complete_job(&self, job_key: &str, variables: Value) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{}/completion", job_key)))
            .json(&json!({ "variables": variables }))
            .send()
            .await?;
        Self::check(response, "job completion").await?;
        Ok(())
    }

    async fn fail_job(&self, job_key: &str, retries: u32, message: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{}/failure", job_key)))
            .json(&json!({ "retries": retries, "errorMessage": message }))
            .send()
            .await?;
        Self::check(response, "job failure").await?;
        Ok(())
    }
}
