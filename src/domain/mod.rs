//! Domain types for a single collection: credentials, provider payloads, outcomes
//! and the retry schedule, plus the ports to the provider and the orchestrator.

pub mod backoff;
pub mod collection;
pub mod credential;
pub mod outcome;
pub mod ports;
pub mod status;
pub mod variables;
