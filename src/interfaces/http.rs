use crate::application::engine::{CallbackReceipt, CollectionEngine};
use crate::application::gateway::ReportReceipt;
use crate::domain::variables::CompletionVariables;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(engine: Arc<CollectionEngine>) -> Router {
    Router::new()
        .route("/collections/callback", post(callback_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

/// Returned when nothing in the orchestrator is waiting for the callback.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CorrelationDiagnostic {
    developer_message: String,
    zeebe_variables: Option<CompletionVariables>,
}

async fn health_handler() -> &'static str {
    "ok"
}

/// The provider only needs to know the body arrived; the outcome itself goes to
/// the orchestrator. An orchestrator outage answers 503 so the provider retries.
async fn callback_handler(State(engine): State<Arc<CollectionEngine>>, body: String) -> Response {
    info!("Callback received");
    let receipt = match engine.handle_callback(&body).await {
        Ok(receipt) => receipt,
        Err(e) => {
            error!(error = %e, "Could not deliver callback outcome");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(CorrelationDiagnostic {
                    developer_message: format!("Orchestrator unavailable: {}", e),
                    zeebe_variables: None,
                }),
            )
                .into_response();
        }
    };

    match receipt {
        CallbackReceipt::Reported {
            transaction_id,
            receipt: ReportReceipt::UnknownCorrelation { variables },
        } => Json(CorrelationDiagnostic {
            developer_message: format!(
                "No workflow instance is waiting for transaction {}",
                transaction_id
            ),
            zeebe_variables: variables,
        })
        .into_response(),
        CallbackReceipt::Reported {
            transaction_id,
            receipt,
        } => {
            let status = match receipt {
                ReportReceipt::Published(_) => "published",
                ReportReceipt::Duplicate(_) => "duplicate",
                _ => "accepted",
            };
            Json(CallbackAck {
                status,
                transaction_id: Some(transaction_id),
            })
            .into_response()
        }
        CallbackReceipt::Intermediate { transaction_id } => Json(CallbackAck {
            status: "intermediate",
            transaction_id: Some(transaction_id),
        })
        .into_response(),
        CallbackReceipt::MissingCorrelation => Json(CorrelationDiagnostic {
            developer_message: "Callback does not identify a transaction".to_string(),
            zeebe_variables: None,
        })
        .into_response(),
    }
}
