//! Provider payloads as they arrive on the wire.
//!
//! Status strings are decoded once, here, into [`TransactionStatus`]; nothing
//! downstream compares raw strings.

use serde::{Deserialize, Serialize};

/// Per-transaction status reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    /// `TS`
    Settled,
    /// `TF`
    Failed,
    /// `TIP`
    InProgress,
    /// `TA`
    Ambiguous,
    Unrecognized(String),
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Settled | TransactionStatus::Failed)
    }

    pub fn as_code(&self) -> &str {
        match self {
            TransactionStatus::Settled => "TS",
            TransactionStatus::Failed => "TF",
            TransactionStatus::InProgress => "TIP",
            TransactionStatus::Ambiguous => "TA",
            TransactionStatus::Unrecognized(code) => code,
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "TS" => TransactionStatus::Settled,
            "TF" => TransactionStatus::Failed,
            "TIP" => TransactionStatus::InProgress,
            "TA" => TransactionStatus::Ambiguous,
            _ => TransactionStatus::Unrecognized(code),
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.as_code().to_string()
    }
}

/// Envelope shared by the collection and status endpoints.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProviderEnvelope {
    #[serde(default)]
    pub data: Option<EnvelopeData>,
    #[serde(default)]
    pub status: Option<StatusBlock>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnvelopeData {
    #[serde(default)]
    pub transaction: Option<EnvelopeTransaction>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvelopeTransaction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub airtel_money_id: Option<String>,
}

/// The `status` block carried by every provider response.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct StatusBlock {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub response_code: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

/// Body pushed by the provider to the callback endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CallbackPayload {
    pub transaction: CallbackTransaction,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CallbackTransaction {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    pub status_code: TransactionStatus,
    #[serde(default)]
    pub airtel_money_id: Option<String>,
}

/// Raw HTTP answer from the provider, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
