//! In-process stand-ins for the provider and the orchestrator.
//!
//! Responses are scripted up front and every call is recorded, which makes them
//! the backbone of the test-suite and of local runs without external systems.

use crate::domain::collection::{CollectionRequest, Market};
use crate::domain::credential::AccessGrant;
use crate::domain::ports::{
    ActivatedJob, CollectionProvider, CompletionMessage, JobClient, Orchestrator,
};
use crate::domain::status::ProviderResponse;
use crate::domain::variables::PendingVariables;
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted<T> {
    Ok(T),
    Unavailable(Option<u16>, String),
    AuthFailure(String),
}

impl<T> Scripted<T> {
    fn into_result(self) -> Result<T> {
        match self {
            Scripted::Ok(value) => Ok(value),
            Scripted::Unavailable(status, message) => {
                Err(ConnectorError::ProviderUnavailable { status, message })
            }
            Scripted::AuthFailure(message) => Err(ConnectorError::AuthFailure(message)),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted provider. An empty grant script hands out a one-hour token; an
/// empty collection or status script answers as unavailable.
#[derive(Default)]
pub struct StubProvider {
    grants: Mutex<VecDeque<Scripted<AccessGrant>>>,
    collections: Mutex<VecDeque<Scripted<ProviderResponse>>>,
    statuses: Mutex<VecDeque<Scripted<ProviderResponse>>>,
    collection_requests: Mutex<Vec<CollectionRequest>>,
    status_delay: Mutex<Option<Duration>>,
    auth_calls: AtomicUsize,
    collection_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_grant(&self, token: &str, expires_in: i64) {
        lock(&self.grants).push_back(Scripted::Ok(AccessGrant {
            access_token: token.to_string(),
            expires_in,
            token_type: Some("bearer".to_string()),
        }));
    }

    pub fn push_auth_failure(&self, message: &str) {
        lock(&self.grants).push_back(Scripted::AuthFailure(message.to_string()));
    }

    pub fn push_collection_response(&self, status: u16, body: impl Into<String>) {
        lock(&self.collections).push_back(Scripted::Ok(ProviderResponse::new(status, body)));
    }

    pub fn push_collection_unavailable(&self, status: Option<u16>, message: &str) {
        lock(&self.collections).push_back(Scripted::Unavailable(status, message.to_string()));
    }

    pub fn push_status_response(&self, status: u16, body: impl Into<String>) {
        lock(&self.statuses).push_back(Scripted::Ok(ProviderResponse::new(status, body)));
    }

    pub fn push_status_unavailable(&self, status: Option<u16>, message: &str) {
        lock(&self.statuses).push_back(Scripted::Unavailable(status, message.to_string()));
    }

    /// Delays every status answer, to widen race windows in tests.
    pub fn set_status_delay(&self, delay: Duration) {
        *lock(&self.status_delay) = Some(delay);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn collection_calls(&self) -> usize {
        self.collection_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn collection_requests(&self) -> Vec<CollectionRequest> {
        lock(&self.collection_requests).clone()
    }
}

#[async_trait]
impl CollectionProvider for StubProvider {
    async fn authenticate(&self) -> Result<AccessGrant> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent callers really overlap.
        tokio::task::yield_now().await;
        let scripted = lock(&self.grants).pop_front();
        match scripted {
            Some(scripted) => scripted.into_result(),
            None => Ok(AccessGrant {
                access_token: "stub-token".to_string(),
                expires_in: 3600,
                token_type: Some("bearer".to_string()),
            }),
        }
    }

    async fn initiate_collection(
        &self,
        _token: &str,
        request: &CollectionRequest,
    ) -> Result<ProviderResponse> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.collection_requests).push(request.clone());
        let scripted = lock(&self.collections).pop_front();
        scripted
            .unwrap_or_else(|| Scripted::Unavailable(None, "no scripted response".to_string()))
            .into_result()
    }

    async fn transaction_status(
        &self,
        _token: &str,
        _transaction_id: &str,
        _market: &Market,
    ) -> Result<ProviderResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.status_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = lock(&self.statuses).pop_front();
        scripted
            .unwrap_or_else(|| Scripted::Unavailable(None, "no scripted response".to_string()))
            .into_result()
    }
}

/// Records what would have been sent to the workflow engine.
#[derive(Default)]
pub struct InMemoryOrchestrator {
    published: Mutex<Vec<CompletionMessage>>,
    variable_updates: Mutex<Vec<(String, PendingVariables)>>,
    rejected_keys: Mutex<HashSet<String>>,
    fail_next_publish: AtomicBool,
    publish_delay: Mutex<Option<Duration>>,
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishing to `key` will fail as an unknown correlation.
    pub fn reject_correlation_key(&self, key: &str) {
        lock(&self.rejected_keys).insert(key.to_string());
    }

    /// The next publish fails as if the broker were unreachable.
    pub fn fail_next_publish(&self) {
        self.fail_next_publish.store(true, Ordering::SeqCst);
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *lock(&self.publish_delay) = Some(delay);
    }

    pub fn published(&self) -> Vec<CompletionMessage> {
        lock(&self.published).clone()
    }

    pub fn published_for(&self, correlation_key: &str) -> Vec<CompletionMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.correlation_key == correlation_key)
            .collect()
    }

    pub fn variable_updates(&self) -> Vec<(String, PendingVariables)> {
        lock(&self.variable_updates).clone()
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn publish_message(&self, message: &CompletionMessage) -> Result<()> {
        let delay = *lock(&self.publish_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_publish.swap(false, Ordering::SeqCst) {
            return Err(ConnectorError::Orchestrator("broker unavailable".to_string()));
        }
        if lock(&self.rejected_keys).contains(&message.correlation_key) {
            return Err(ConnectorError::UnknownCorrelation(
                message.correlation_key.clone(),
            ));
        }
        lock(&self.published).push(message.clone());
        Ok(())
    }

    async fn set_variables(
        &self,
        element_instance_key: &str,
        variables: &PendingVariables,
    ) -> Result<()> {
        lock(&self.variable_updates).push((element_instance_key.to_string(), variables.clone()));
        Ok(())
    }
}

/// A job queue that hands out pre-loaded jobs and records completions.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<ActivatedJob>>,
    completed: Mutex<Vec<(String, Value)>>,
    failed: Mutex<Vec<(String, u32, String)>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: ActivatedJob) {
        lock(&self.jobs).push_back(job);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn completed(&self) -> Vec<(String, Value)> {
        lock(&self.completed).clone()
    }

    pub fn failed(&self) -> Vec<(String, u32, String)> {
        lock(&self.failed).clone()
    }
}

#[async_trait]
impl JobClient for InMemoryJobQueue {
    async fn activate_jobs(&self, job_type: &str, max_jobs: u32) -> Result<Vec<ActivatedJob>> {
        let mut jobs = lock(&self.jobs);
        let mut activated = Vec::new();
        let mut rest = VecDeque::new();
        while let Some(job) = jobs.pop_front() {
            if job.job_type == job_type && activated.len() < max_jobs as usize {
                activated.push(job);
            } else {
                rest.push_back(job);
            }
        }
        *jobs = rest;
        Ok(activated)
    }

    async fn complete_job(&self, job_key: &str, variables: Value) -> Result<()> {
        lock(&self.completed).push((job_key.to_string(), variables));
        Ok(())
    }

    async fn fail_job(&self, job_key: &str, retries: u32, message: &str) -> Result<()> {
        lock(&self.failed).push((job_key.to_string(), retries, message.to_string()));
        Ok(())
    }
}
