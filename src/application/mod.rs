//! Application layer containing the collection finalization logic.
//!
//! `CollectionEngine` is the entry point for the job workers and the callback
//! endpoint. It leans on a shared `CredentialCache` for provider tokens, the pure
//! functions in `resolver` to classify provider answers, and the
//! `CorrelationGateway` to report each transaction's outcome exactly once.

pub mod credentials;
pub mod engine;
pub mod gateway;
pub mod resolver;
