use super::credentials::CredentialCache;
use super::gateway::{CorrelationGateway, ReportReceipt};
use super::resolver::{resolve_callback, resolve_collection, resolve_poll_error, resolve_status};
use crate::domain::backoff::{is_retry_exceeded, next_delay};
use crate::domain::collection::{CollectionRequest, Market};
use crate::domain::outcome::{FailureDetail, Outcome, OutcomeSignal, Resolution, TransactionState};
use crate::domain::ports::{OrchestratorRef, ProviderRef};
use crate::domain::status::ProviderResponse;
use crate::domain::variables::InitiationVariables;
use crate::error::Result;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Result of the synchronous collection request.
#[derive(Debug, Clone, PartialEq)]
pub struct Initiation {
    pub outcome: Outcome,
    pub response: Option<ProviderResponse>,
}

impl Initiation {
    pub fn variables(&self, request_body: Option<String>) -> InitiationVariables {
        let mut vars = InitiationVariables {
            collection_request_body: request_body,
            collection_response_body: self.response.as_ref().map(|r| r.body.clone()),
            ..Default::default()
        };
        if let Outcome::Failed(detail) = &self.outcome {
            vars.transaction_failed = true;
            vars.transfer_create_failed = true;
            vars.error_code = detail.code.clone();
            vars.error_description = detail.description.clone();
            vars.error_information = detail.information.clone();
        }
        vars
    }
}

/// One scheduled status check, as handed over by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PollRequest {
    pub transaction_id: String,
    pub element_instance_key: String,
    /// 1-based number of this poll.
    pub attempt: u32,
    /// Delay that preceded this poll.
    pub timer: Duration,
    pub market: Market,
}

/// How an inbound callback was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackReceipt {
    Reported {
        transaction_id: String,
        receipt: ReportReceipt,
    },
    /// Non-terminal status; the polling path will pick it up.
    Intermediate { transaction_id: String },
    /// The body names no transaction.
    MissingCorrelation,
}

/// Drives a collection from initiation to its single reported outcome.
pub struct CollectionEngine {
    provider: ProviderRef,
    credentials: CredentialCache,
    gateway: CorrelationGateway,
    max_retries: u32,
}

impl CollectionEngine {
    pub fn new(
        provider: ProviderRef,
        orchestrator: OrchestratorRef,
        max_retries: u32,
        message_ttl: Duration,
    ) -> Self {
        Self {
            credentials: CredentialCache::new(provider.clone()),
            provider,
            gateway: CorrelationGateway::new(orchestrator, message_ttl),
            max_retries,
        }
    }

    pub fn gateway(&self) -> &CorrelationGateway {
        &self.gateway
    }

    /// Sends the collection request and classifies the synchronous answer.
    ///
    /// A rejected collection closes the transaction: the orchestrator learns
    /// about it from the job result, and later signals for it are dropped.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction.id))]
    pub async fn initiate(&self, request: &CollectionRequest) -> Initiation {
        let transaction_id = &request.transaction.id;
        self.gateway.track(transaction_id);
        info!("Starting collection request flow");

        let result = match self.credentials.token().await {
            Ok(token) => self.provider.initiate_collection(&token, request).await,
            Err(e) => Err(e),
        };

        let (resolution, response) = match result {
            Ok(response) => {
                info!(status = response.status, "Collection API responded");
                (resolve_collection(&response), Some(response))
            }
            Err(e) => {
                warn!(error = %e, "Collection request could not be delivered");
                (
                    Resolution::Failed(FailureDetail {
                        code: e.http_status().map(|s| s.to_string()),
                        description: Some(e.to_string()),
                        information: None,
                    }),
                    None,
                )
            }
        };

        let outcome = match resolution {
            Resolution::Failed(detail) => {
                warn!(code = ?detail.code, "Collection request unsuccessful");
                self.gateway
                    .close(transaction_id, TransactionState::Failed)
                    .await;
                Outcome::Failed(detail)
            }
            Resolution::Settled { external_ref } => {
                info!("Collection request successful");
                Outcome::Succeeded { external_ref }
            }
            // Collection answers are never pending.
            Resolution::Pending { .. } => Outcome::Succeeded { external_ref: None },
        };

        Initiation { outcome, response }
    }

    /// Runs one scheduled status check and reports the result.
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, attempt = request.attempt))]
    pub async fn poll(&self, request: &PollRequest) -> Result<ReportReceipt> {
        if is_retry_exceeded(request.attempt, self.max_retries) {
            warn!(max = self.max_retries, "Retry limit exceeded before polling");
            return self.report_exhausted(request, None).await;
        }
        if let Some(state) = self.gateway.state(&request.transaction_id).await
            && state.is_terminal()
        {
            info!(?state, "Transaction already resolved, skipping status call");
            return Ok(ReportReceipt::Duplicate(state));
        }
        let following = next_delay(request.timer)?;

        info!("Checking transaction status");
        let result = match self.credentials.token().await {
            Ok(token) => {
                self.provider
                    .transaction_status(&token, &request.transaction_id, &request.market)
                    .await
            }
            Err(e) => Err(e),
        };

        let (resolution, raw) = match result {
            Ok(response) => {
                info!(status = response.status, "Transaction status API responded");
                (resolve_status(&response), Some(response))
            }
            Err(e) => {
                warn!(error = %e, "Transaction status request unsuccessful");
                (resolve_poll_error(&e), None)
            }
        };

        let outcome = match resolution {
            Resolution::Settled { external_ref } => Outcome::Succeeded { external_ref },
            Resolution::Failed(detail) => Outcome::Failed(detail),
            Resolution::Pending { last_response } => {
                if is_retry_exceeded(request.attempt + 1, self.max_retries) {
                    warn!(max = self.max_retries, "Still pending on the last allowed attempt");
                    return self.report_exhausted(request, last_response).await;
                }
                let signal = OutcomeSignal::from_poll(
                    &request.transaction_id,
                    &request.element_instance_key,
                    request.attempt,
                    last_response,
                    Outcome::Pending {
                        attempt_count: request.attempt,
                        next_delay: following,
                    },
                );
                return self.gateway.report(signal).await;
            }
        };

        let signal = OutcomeSignal::from_poll(
            &request.transaction_id,
            &request.element_instance_key,
            request.attempt,
            raw,
            outcome,
        );
        self.gateway.report(signal).await
    }

    /// Handles a body pushed to the callback endpoint.
    #[instrument(skip_all)]
    pub async fn handle_callback(&self, body: &str) -> Result<CallbackReceipt> {
        let resolved = resolve_callback(body);
        let Some(transaction_id) = resolved.transaction_id else {
            warn!("Callback does not name a transaction");
            return Ok(CallbackReceipt::MissingCorrelation);
        };
        info!(transaction_id = %transaction_id, "Handling callback");

        let outcome = match resolved.resolution {
            Resolution::Settled { external_ref } => Outcome::Succeeded { external_ref },
            Resolution::Failed(detail) => Outcome::Failed(detail),
            Resolution::Pending { .. } => {
                info!(
                    transaction_id = %transaction_id,
                    "Transaction is in intermediate state, the status poll will follow up"
                );
                return Ok(CallbackReceipt::Intermediate { transaction_id });
            }
        };

        let signal = OutcomeSignal::from_callback(&transaction_id, body, outcome);
        let receipt = self.gateway.report(signal).await?;
        Ok(CallbackReceipt::Reported {
            transaction_id,
            receipt,
        })
    }

    /// Reports success for a poll without contacting the provider.
    pub async fn settle_without_provider(
        &self,
        transaction_id: &str,
        element_instance_key: &str,
        attempt: u32,
    ) -> Result<ReportReceipt> {
        info!(transaction_id, "Skipping provider, reporting success");
        let signal = OutcomeSignal::from_poll(
            transaction_id,
            element_instance_key,
            attempt,
            None,
            Outcome::Succeeded { external_ref: None },
        );
        self.gateway.report(signal).await
    }

    async fn report_exhausted(
        &self,
        request: &PollRequest,
        last_response: Option<ProviderResponse>,
    ) -> Result<ReportReceipt> {
        let signal = OutcomeSignal::from_poll(
            &request.transaction_id,
            &request.element_instance_key,
            request.attempt,
            last_response,
            Outcome::RetryExceeded {
                attempt_count: request.attempt,
            },
        );
        self.gateway.report(signal).await
    }
}
