//! Classification of provider answers.
//!
//! Every function here is pure: it looks at one response and says whether the
//! transaction settled, failed, or is still pending. Retry bookkeeping is layered
//! on top by the engine.

use crate::domain::outcome::{FailureDetail, Resolution};
use crate::domain::status::{
    CallbackPayload, ProviderEnvelope, ProviderResponse, TransactionStatus,
};
use crate::error::ConnectorError;
use serde_json::Value;

/// Result of reading a callback body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResolution {
    /// `None` when the body is too broken to name a transaction.
    pub transaction_id: Option<String>,
    pub resolution: Resolution,
}

/// Synchronous answer to a collection request.
pub fn resolve_collection(response: &ProviderResponse) -> Resolution {
    if response.is_success() {
        return Resolution::Settled { external_ref: None };
    }

    match serde_json::from_str::<ProviderEnvelope>(&response.body)
        .ok()
        .and_then(|envelope| envelope.status)
    {
        Some(status) => Resolution::Failed(FailureDetail {
            code: status.response_code.or(status.code),
            description: status.message,
            information: Some(response.body.clone()),
        }),
        None => Resolution::Failed(http_failure(response)),
    }
}

/// Answer from the status endpoint.
///
/// 5xx answers are transient and keep the transaction pending; other non-2xx
/// answers and malformed bodies fail it.
pub fn resolve_status(response: &ProviderResponse) -> Resolution {
    if response.status >= 500 {
        return Resolution::Pending {
            last_response: Some(response.clone()),
        };
    }
    if !response.is_success() {
        return resolve_collection(response);
    }

    let envelope = match serde_json::from_str::<ProviderEnvelope>(&response.body) {
        Ok(envelope) => envelope,
        Err(_) => return Resolution::Failed(malformed(&response.body)),
    };
    let Some(transaction) = envelope.data.and_then(|d| d.transaction) else {
        return Resolution::Failed(malformed(&response.body));
    };

    match transaction.status {
        Some(TransactionStatus::Settled) => Resolution::Settled {
            external_ref: transaction.airtel_money_id,
        },
        Some(TransactionStatus::Failed) => {
            let status = envelope.status.unwrap_or_default();
            Resolution::Failed(FailureDetail {
                code: status.response_code.or(status.code),
                description: status.message.or(transaction.message),
                information: Some(response.body.clone()),
            })
        }
        Some(_) => Resolution::Pending {
            last_response: Some(response.clone()),
        },
        None => Resolution::Failed(malformed(&response.body)),
    }
}

/// A poll that never got a usable answer.
///
/// Authentication and transport problems are treated as transient; anything else
/// is a contract violation.
pub fn resolve_poll_error(error: &ConnectorError) -> Resolution {
    match error {
        ConnectorError::AuthFailure(_)
        | ConnectorError::ProviderUnavailable { .. }
        | ConnectorError::Http(_) => Resolution::Pending {
            last_response: Some(ProviderResponse::new(
                error.http_status().unwrap_or_default(),
                error.to_string(),
            )),
        },
        _ => Resolution::Failed(FailureDetail {
            code: None,
            description: Some(error.to_string()),
            information: None,
        }),
    }
}

/// Body pushed to the callback endpoint.
pub fn resolve_callback(body: &str) -> CallbackResolution {
    match serde_json::from_str::<CallbackPayload>(body) {
        Ok(payload) => {
            let transaction = payload.transaction;
            let resolution = match transaction.status_code {
                TransactionStatus::Settled => Resolution::Settled {
                    external_ref: transaction.airtel_money_id,
                },
                TransactionStatus::Failed => Resolution::Failed(FailureDetail {
                    code: None,
                    description: transaction.message,
                    information: Some(body.to_string()),
                }),
                _ => Resolution::Pending {
                    last_response: None,
                },
            };
            CallbackResolution {
                transaction_id: Some(transaction.id),
                resolution,
            }
        }
        Err(_) => CallbackResolution {
            transaction_id: salvage_transaction_id(body),
            resolution: Resolution::Failed(malformed(body)),
        },
    }
}

/// Best-effort id lookup in a body that does not match the callback schema.
fn salvage_transaction_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/transaction/id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn malformed(body: &str) -> FailureDetail {
    FailureDetail {
        code: None,
        description: Some("Malformed provider response".to_string()),
        information: Some(body.to_string()),
    }
}

fn http_failure(response: &ProviderResponse) -> FailureDetail {
    FailureDetail {
        code: None,
        description: Some(format!("HTTP {}", response.status)),
        information: Some(response.body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_body(status: &str) -> String {
        format!(
            r#"{{"data":{{"transaction":{{"id":"tx-1","status":"{}","airtel_money_id":"MP1","message":"msg"}}}},
               "status":{{"code":"200","message":"Transaction failed","response_code":"DP00800001001","success":true}}}}"#,
            status
        )
    }

    #[test]
    fn test_collection_success_has_no_error_fields() {
        let resolution = resolve_collection(&ProviderResponse::new(200, ""));
        assert_eq!(resolution, Resolution::Settled { external_ref: None });
    }

    #[test]
    fn test_collection_failure_uses_status_block() {
        let body = r#"{"status":{"response_code":"DP00800001005","message":"Invalid Amount"}}"#;
        let resolution = resolve_collection(&ProviderResponse::new(400, body));

        let Resolution::Failed(detail) = resolution else {
            panic!("expected failure, got {:?}", resolution);
        };
        assert_eq!(detail.code.as_deref(), Some("DP00800001005"));
        assert_eq!(detail.description.as_deref(), Some("Invalid Amount"));
        assert_eq!(detail.information.as_deref(), Some(body));
    }

    #[test]
    fn test_collection_failure_with_unparseable_body() {
        let resolution = resolve_collection(&ProviderResponse::new(502, "<html>bad gateway</html>"));
        assert_eq!(
            resolution,
            Resolution::Failed(FailureDetail {
                code: None,
                description: Some("HTTP 502".to_string()),
                information: Some("<html>bad gateway</html>".to_string()),
            })
        );
    }

    #[test]
    fn test_status_settled_captures_reference() {
        let resolution = resolve_status(&ProviderResponse::new(200, status_body("TS")));
        assert_eq!(
            resolution,
            Resolution::Settled {
                external_ref: Some("MP1".to_string())
            }
        );
    }

    #[test]
    fn test_status_failed_takes_status_block() {
        let body = status_body("TF");
        let Resolution::Failed(detail) = resolve_status(&ProviderResponse::new(200, body.clone()))
        else {
            panic!("expected failure");
        };
        assert_eq!(detail.code.as_deref(), Some("DP00800001001"));
        assert_eq!(detail.description.as_deref(), Some("Transaction failed"));
        assert_eq!(detail.information, Some(body));
    }

    #[test]
    fn test_status_in_progress_keeps_body() {
        let response = ProviderResponse::new(200, status_body("TIP"));
        assert_eq!(
            resolve_status(&response),
            Resolution::Pending {
                last_response: Some(response.clone())
            }
        );
        let unknown = ProviderResponse::new(200, status_body("XYZ"));
        assert!(matches!(resolve_status(&unknown), Resolution::Pending { .. }));
    }

    #[test]
    fn test_status_server_error_is_transient() {
        let response = ProviderResponse::new(503, "unavailable");
        assert!(matches!(resolve_status(&response), Resolution::Pending { .. }));
    }

    #[test]
    fn test_status_malformed_body_fails_without_code() {
        let Resolution::Failed(detail) = resolve_status(&ProviderResponse::new(200, "not json"))
        else {
            panic!("expected failure");
        };
        assert_eq!(detail.code, None);
        assert_eq!(detail.information.as_deref(), Some("not json"));

        let missing_transaction = ProviderResponse::new(200, r#"{"data":{}}"#);
        assert!(matches!(
            resolve_status(&missing_transaction),
            Resolution::Failed(_)
        ));
    }

    #[test]
    fn test_poll_errors() {
        let transient = ConnectorError::ProviderUnavailable {
            status: None,
            message: "timed out".to_string(),
        };
        assert!(matches!(
            resolve_poll_error(&transient),
            Resolution::Pending { .. }
        ));
        assert!(matches!(
            resolve_poll_error(&ConnectorError::AuthFailure("401".to_string())),
            Resolution::Pending { .. }
        ));
        assert!(matches!(
            resolve_poll_error(&ConnectorError::InvalidJob("x".to_string())),
            Resolution::Failed(_)
        ));
    }

    #[test]
    fn test_callback_mapping() {
        let settled = r#"{"transaction":{"id":"tx-1","message":"ok","status_code":"TS","airtel_money_id":"MP9"},"hash":"h"}"#;
        let resolved = resolve_callback(settled);
        assert_eq!(resolved.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(
            resolved.resolution,
            Resolution::Settled {
                external_ref: Some("MP9".to_string())
            }
        );

        let failed = r#"{"transaction":{"id":"tx-2","message":"Insufficient funds","status_code":"TF"}}"#;
        let Resolution::Failed(detail) = resolve_callback(failed).resolution else {
            panic!("expected failure");
        };
        assert_eq!(detail.code, None);
        assert_eq!(detail.description.as_deref(), Some("Insufficient funds"));
        assert_eq!(detail.information.as_deref(), Some(failed));

        let pending = r#"{"transaction":{"id":"tx-3","status_code":"TIP"}}"#;
        assert!(matches!(
            resolve_callback(pending).resolution,
            Resolution::Pending { .. }
        ));
    }

    #[test]
    fn test_malformed_callback() {
        let wrong_shape = r#"{"transaction":{"id":"tx-4","status_code":42}}"#;
        let resolved = resolve_callback(wrong_shape);
        assert_eq!(resolved.transaction_id.as_deref(), Some("tx-4"));
        assert!(matches!(resolved.resolution, Resolution::Failed(_)));

        let garbage = resolve_callback("<xml/>");
        assert_eq!(garbage.transaction_id, None);
    }
}
