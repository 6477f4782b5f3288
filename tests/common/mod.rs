#![allow(dead_code)]

use airtel_connector::application::engine::{CollectionEngine, PollRequest};
use airtel_connector::domain::collection::Market;
use airtel_connector::infrastructure::in_memory::{InMemoryOrchestrator, StubProvider};
use std::sync::Arc;
use std::time::Duration;

pub struct Fixture {
    pub provider: Arc<StubProvider>,
    pub orchestrator: Arc<InMemoryOrchestrator>,
    pub engine: Arc<CollectionEngine>,
}

pub fn fixture(max_retries: u32) -> Fixture {
    let provider = Arc::new(StubProvider::new());
    let orchestrator = Arc::new(InMemoryOrchestrator::new());
    let engine = Arc::new(CollectionEngine::new(
        provider.clone(),
        orchestrator.clone(),
        max_retries,
        Duration::from_secs(300),
    ));
    Fixture {
        provider,
        orchestrator,
        engine,
    }
}

pub fn uganda() -> Market {
    Market {
        country: "UG".to_string(),
        currency: "UGX".to_string(),
    }
}

pub fn poll_request(transaction_id: &str, attempt: u32, timer_secs: u64) -> PollRequest {
    PollRequest {
        transaction_id: transaction_id.to_string(),
        element_instance_key: format!("eik-{}", transaction_id),
        attempt,
        timer: Duration::from_secs(timer_secs),
        market: uganda(),
    }
}

/// Body of the status endpoint for `transaction_id` in state `code`.
pub fn status_body(transaction_id: &str, code: &str) -> String {
    format!(
        r#"{{"data":{{"transaction":{{"id":"{}","message":"status {}","status":"{}","airtel_money_id":"MP-{}"}}}},"status":{{"code":"200","message":"SUCCESS","response_code":"DP00800001001","success":true}}}}"#,
        transaction_id, code, code, transaction_id
    )
}

pub fn callback_body(transaction_id: &str, code: &str) -> String {
    format!(
        r#"{{"transaction":{{"id":"{}","message":"callback {}","status_code":"{}","airtel_money_id":"MP-{}"}},"hash":"abc"}}"#,
        transaction_id, code, code, transaction_id
    )
}
