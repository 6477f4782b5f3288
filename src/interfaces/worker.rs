//! Job workers for the two service tasks of the collection process.

use crate::application::engine::{CollectionEngine, PollRequest};
use crate::application::gateway::ReportReceipt;
use crate::domain::backoff::{format_timer, next_delay, parse_timer};
use crate::domain::collection::{CollectionRequest, market_for};
use crate::domain::ports::{ActivatedJob, JobClientRef};
use crate::domain::variables::{
    CHANNEL_REQUEST, INIT_TRANSFER_JOB, InitiationVariables, RETRY_COUNT, TIMER,
    TRANSACTION_ID, TRANSACTION_STATUS_JOB,
};
use crate::error::{ConnectorError, Result};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, instrument, warn};

/// Delay before the first status poll when the process did not seed a timer.
const DEFAULT_TIMER: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_jobs: u32,
    pub poll_interval: Duration,
    pub skip_provider: bool,
    /// Lowercase currency code to provider country.
    pub country_codes: HashMap<String, String>,
    pub collection_reference: String,
}

pub struct JobWorker {
    jobs: JobClientRef,
    engine: Arc<CollectionEngine>,
    settings: WorkerSettings,
    slots: Arc<Semaphore>,
}

impl JobWorker {
    pub fn new(jobs: JobClientRef, engine: Arc<CollectionEngine>, settings: WorkerSettings) -> Self {
        let slots = Arc::new(Semaphore::new(settings.max_jobs.max(1) as usize));
        Self {
            jobs,
            engine,
            settings,
            slots,
        }
    }

    /// Activates and processes jobs of `job_type` until `shutdown` flips to true.
    ///
    /// No more than `max_jobs` jobs are in flight at once.
    pub async fn run(self: Arc<Self>, job_type: &'static str, mut shutdown: watch::Receiver<bool>) {
        info!(job_type, max_jobs = self.settings.max_jobs, "Job worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let first = tokio::select! {
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };
            let free = self.slots.available_permits() as u32 + 1;

            let activated = match self.jobs.activate_jobs(job_type, free).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(job_type, error = %e, "Job activation failed");
                    Vec::new()
                }
            };

            if activated.is_empty() {
                drop(first);
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            }

            debug!(job_type, count = activated.len(), "Activated jobs");
            let mut first = Some(first);
            for job in activated {
                let permit = match first.take() {
                    Some(permit) => permit,
                    None => match self.slots.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                let worker = self.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.process(job).await;
                });
            }
        }
        info!(job_type, "Job worker stopped");
    }

    /// Handles one job and settles it with the orchestrator.
    ///
    /// Jobs with unusable variables are failed without retries. Any other error
    /// leaves the job alone so that it is handed out again after its timeout.
    pub async fn process(&self, job: ActivatedJob) {
        match self.handle(&job).await {
            Ok(()) => {}
            Err(ConnectorError::InvalidJob(message) | ConnectorError::InvalidBackoff(message)) => {
                error!(job_key = %job.key, %message, "Rejecting job");
                if let Err(e) = self.jobs.fail_job(&job.key, 0, &message).await {
                    error!(job_key = %job.key, error = %e, "Could not fail job");
                }
            }
            Err(e) => {
                error!(job_key = %job.key, error = %e, "Job left for redelivery");
            }
        }
    }

    pub async fn handle(&self, job: &ActivatedJob) -> Result<()> {
        match job.job_type.as_str() {
            INIT_TRANSFER_JOB => self.init_transfer(job).await,
            TRANSACTION_STATUS_JOB => self.transaction_status(job).await,
            other => Err(ConnectorError::InvalidJob(format!(
                "unsupported job type '{}'",
                other
            ))),
        }
    }

    #[instrument(skip(self, job), fields(job_key = %job.key))]
    async fn init_transfer(&self, job: &ActivatedJob) -> Result<()> {
        let transaction_id = transaction_id(job)?;

        let variables = if self.settings.skip_provider {
            info!(%transaction_id, "Skipping provider for collection request");
            InitiationVariables::default()
        } else {
            match self.collection_request(job, &transaction_id) {
                Ok(request) => {
                    let body = serde_json::to_string(&request)?;
                    self.engine.initiate(&request).await.variables(Some(body))
                }
                Err(e) => {
                    warn!(%transaction_id, error = %e, "Could not build collection request");
                    InitiationVariables {
                        transaction_failed: true,
                        transfer_create_failed: true,
                        error_description: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            }
        };

        self.jobs
            .complete_job(&job.key, serde_json::to_value(&variables)?)
            .await
    }

    #[instrument(skip(self, job), fields(job_key = %job.key))]
    async fn transaction_status(&self, job: &ActivatedJob) -> Result<()> {
        let transaction_id = transaction_id(job)?;
        let attempt = previous_attempts(&job.variables).saturating_add(1);

        let receipt = if self.settings.skip_provider {
            self.engine
                .settle_without_provider(&transaction_id, &job.element_instance_key, attempt)
                .await?
        } else {
            let timer = match job.variables.get(TIMER).and_then(Value::as_str) {
                Some(timer) => usable_timer(timer)?,
                None => DEFAULT_TIMER,
            };
            let market = market_for(&channel_request(job)?, &self.settings.country_codes)?;
            self.engine
                .poll(&PollRequest {
                    transaction_id: transaction_id.clone(),
                    element_instance_key: job.element_instance_key.clone(),
                    attempt,
                    timer,
                    market,
                })
                .await?
        };
        debug!(%transaction_id, ?receipt, "Status job handled");

        let mut variables = Map::new();
        variables.insert(RETRY_COUNT.to_string(), json!(attempt));
        if let ReportReceipt::Rescheduled { next_delay, .. } = &receipt {
            variables.insert(TIMER.to_string(), json!(format_timer(*next_delay)));
        }
        self.jobs
            .complete_job(&job.key, Value::Object(variables))
            .await
    }

    fn collection_request(&self, job: &ActivatedJob, transaction_id: &str) -> Result<CollectionRequest> {
        CollectionRequest::from_channel_request(
            &channel_request(job)?,
            transaction_id,
            &self.settings.collection_reference,
            &self.settings.country_codes,
        )
    }
}

fn transaction_id(job: &ActivatedJob) -> Result<String> {
    job.variables
        .get(TRANSACTION_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConnectorError::InvalidJob(format!("job has no {}", TRANSACTION_ID)))
}

/// The channel request arrives either as an object or as its JSON text.
fn channel_request(job: &ActivatedJob) -> Result<Value> {
    match job.variables.get(CHANNEL_REQUEST) {
        Some(Value::String(text)) => serde_json::from_str(text).map_err(|e| {
            ConnectorError::InvalidJob(format!("{} is not valid JSON: {}", CHANNEL_REQUEST, e))
        }),
        Some(value @ Value::Object(_)) => Ok(value.clone()),
        _ => Err(ConnectorError::InvalidJob(format!(
            "job has no {}",
            CHANNEL_REQUEST
        ))),
    }
}

/// A timer the schedule can advance from; anything else can never settle.
fn usable_timer(timer: &str) -> Result<Duration> {
    parse_timer(timer)
        .and_then(|delay| next_delay(delay).map(|_| delay))
        .map_err(|e| ConnectorError::InvalidJob(format!("{} '{}': {}", TIMER, timer, e)))
}

fn previous_attempts(variables: &Map<String, Value>) -> u32 {
    variables
        .get(RETRY_COUNT)
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}
