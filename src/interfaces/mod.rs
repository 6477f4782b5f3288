//! Inbound adapters: the provider's callback endpoint and the orchestrator's
//! job workers.

pub mod http;
pub mod worker;
