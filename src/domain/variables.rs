//! Workflow variables exchanged with the orchestrator.
//!
//! The engine works with [`Outcome`] values; these structs are the only place
//! where an outcome is flattened into the variable names the process definition
//! reads.

use super::outcome::{FailureDetail, Outcome, OutcomeSignal, SignalOrigin};
use super::status::ProviderResponse;
use crate::domain::backoff::format_timer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

pub const TRANSACTION_ID: &str = "transactionId";
pub const CHANNEL_REQUEST: &str = "channelRequest";
pub const RETRY_COUNT: &str = "airtelTransactionStatusRetryCount";
pub const TIMER: &str = "timer";
/// Message the waiting process instance is subscribed to.
pub const TRANSFER_MESSAGE: &str = "airtel-transaction-request";
pub const INIT_TRANSFER_JOB: &str = "init-airtel-transfer";
pub const TRANSACTION_STATUS_JOB: &str = "get-airtel-transaction-status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResponse {
    #[serde(rename = "completedTimestamp")]
    pub completed_timestamp: String,
}

impl TransferResponse {
    pub fn at(completed_at: DateTime<Utc>) -> Self {
        Self {
            completed_timestamp: completed_at.timestamp_millis().to_string(),
        }
    }
}

/// Variables written in place while a transaction is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVariables {
    #[serde(rename = "airtelTransactionStatusRetryCount")]
    pub retry_count: u32,
    pub timer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_transaction_status_response: Option<String>,
    #[serde(
        rename = "getTransactionStatusHttpCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub get_transaction_status_http_code: Option<u16>,
}

impl PendingVariables {
    pub fn new(
        retry_count: u32,
        next_delay: Duration,
        last_response: Option<&ProviderResponse>,
    ) -> Self {
        Self {
            retry_count,
            timer: format_timer(next_delay),
            get_transaction_status_response: last_response.map(|r| r.body.clone()),
            get_transaction_status_http_code: last_response.map(|r| r.status),
        }
    }
}

/// Variables published with the terminal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionVariables {
    pub transaction_failed: bool,
    pub transfer_create_failed: bool,
    pub is_retry_exceeded: bool,
    #[serde(
        rename = "airtelTransactionStatusRetryCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_transaction_status_response: Option<String>,
    #[serde(
        rename = "getTransactionStatusHttpCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub get_transaction_status_http_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_information: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_callback_received: Option<bool>,
    #[serde(rename = "transferResponse-CREATE")]
    pub transfer_response: TransferResponse,
}

impl CompletionVariables {
    /// Flattens a terminal signal. Pending signals have no completion form.
    ///
    /// The raw poll answer is dropped once retries are exhausted.
    pub fn from_signal(signal: &OutcomeSignal, completed_at: DateTime<Utc>) -> Option<Self> {
        let mut vars = Self::blank(completed_at);
        let mut last_response = None;

        if let SignalOrigin::Poll {
            attempt,
            last_response: response,
            ..
        } = &signal.origin
        {
            vars.retry_count = Some(*attempt);
            last_response = response.as_ref();
        }

        match &signal.outcome {
            Outcome::Pending { .. } => return None,
            Outcome::Succeeded { external_ref } => {
                vars.external_id = external_ref.clone();
                if let SignalOrigin::Callback { payload } = &signal.origin {
                    vars.callback = Some(payload.clone());
                    vars.is_callback_received = Some(true);
                }
            }
            Outcome::Failed(FailureDetail {
                code,
                description,
                information,
            }) => {
                vars.transaction_failed = true;
                vars.transfer_create_failed = true;
                vars.error_code = code.clone();
                vars.error_description = description.clone();
                vars.error_information = information.clone();
            }
            Outcome::RetryExceeded { .. } => {
                vars.transaction_failed = true;
                vars.transfer_create_failed = true;
                vars.is_retry_exceeded = true;
                return Some(vars);
            }
        }

        if let Some(response) = last_response {
            vars.get_transaction_status_response = Some(response.body.clone());
            vars.get_transaction_status_http_code = Some(response.status);
        }
        Some(vars)
    }

    fn blank(completed_at: DateTime<Utc>) -> Self {
        Self {
            transaction_failed: false,
            transfer_create_failed: false,
            is_retry_exceeded: false,
            retry_count: None,
            get_transaction_status_response: None,
            get_transaction_status_http_code: None,
            error_code: None,
            error_description: None,
            error_information: None,
            external_id: None,
            callback: None,
            is_callback_received: None,
            transfer_response: TransferResponse::at(completed_at),
        }
    }
}

/// Variables set when the initiation job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitiationVariables {
    pub transaction_failed: bool,
    pub transfer_create_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_information: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_variables_names() {
        let response = ProviderResponse::new(200, r#"{"data":{}}"#);
        let vars = PendingVariables::new(2, Duration::from_secs(128), Some(&response));
        let value = serde_json::to_value(&vars).unwrap();

        assert_eq!(value[RETRY_COUNT], json!(2));
        assert_eq!(value[TIMER], json!("PT128S"));
        assert_eq!(value["getTransactionStatusResponse"], json!(r#"{"data":{}}"#));
        assert_eq!(value["getTransactionStatusHttpCode"], json!(200));
    }

    #[test]
    fn test_retry_exceeded_omits_last_response() {
        let signal = OutcomeSignal::from_poll(
            "tx-1",
            "42",
            6,
            Some(ProviderResponse::new(200, "body")),
            Outcome::RetryExceeded { attempt_count: 6 },
        );
        let vars = CompletionVariables::from_signal(&signal, Utc::now()).unwrap();
        let value = serde_json::to_value(&vars).unwrap();

        assert_eq!(value["transactionFailed"], json!(true));
        assert_eq!(value["isRetryExceeded"], json!(true));
        assert!(value.get("getTransactionStatusResponse").is_none());
        assert!(value.get("getTransactionStatusHttpCode").is_none());
        assert!(value.get("errorCode").is_none());
        assert!(value["transferResponse-CREATE"]["completedTimestamp"].is_string());
    }

    #[test]
    fn test_callback_success_carries_callback_body() {
        let signal = OutcomeSignal::from_callback(
            "tx-1",
            "{raw}",
            Outcome::Succeeded {
                external_ref: Some("MP1".to_string()),
            },
        );
        let vars = CompletionVariables::from_signal(&signal, Utc::now()).unwrap();
        let value = serde_json::to_value(&vars).unwrap();

        assert_eq!(value["transactionFailed"], json!(false));
        assert_eq!(value["externalId"], json!("MP1"));
        assert_eq!(value["callback"], json!("{raw}"));
        assert_eq!(value["isCallbackReceived"], json!(true));
        assert!(value.get(RETRY_COUNT).is_none());
    }

    #[test]
    fn test_pending_signal_has_no_completion() {
        let signal = OutcomeSignal::from_poll(
            "tx-1",
            "42",
            1,
            None,
            Outcome::Pending {
                attempt_count: 1,
                next_delay: Duration::from_secs(64),
            },
        );
        assert!(CompletionVariables::from_signal(&signal, Utc::now()).is_none());
    }

    #[test]
    fn test_poll_failure_keeps_last_response() {
        let signal = OutcomeSignal::from_poll(
            "tx-1",
            "42",
            2,
            Some(ProviderResponse::new(200, "tf-body")),
            Outcome::Failed(FailureDetail {
                code: Some("DP00800001001".to_string()),
                description: Some("Declined".to_string()),
                information: Some("tf-body".to_string()),
            }),
        );
        let vars = CompletionVariables::from_signal(&signal, Utc::now()).unwrap();

        assert!(vars.transaction_failed);
        assert_eq!(vars.retry_count, Some(2));
        assert_eq!(vars.error_code.as_deref(), Some("DP00800001001"));
        assert_eq!(vars.get_transaction_status_response.as_deref(), Some("tf-body"));
        assert_eq!(vars.get_transaction_status_http_code, Some(200));
    }
}
