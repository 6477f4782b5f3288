use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The provider rejected the credential exchange or answered with something
    /// that is not a token.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),
    /// Timeout, connection error or 5xx from the provider.
    #[error("Provider unavailable (status {status:?}): {message}")]
    ProviderUnavailable { status: Option<u16>, message: String },
    #[error("Unknown correlation key: {0}")]
    UnknownCorrelation(String),
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),
    #[error("Invalid backoff duration: {0}")]
    InvalidBackoff(String),
    #[error("Invalid job variables: {0}")]
    InvalidJob(String),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// HTTP status carried by the error, when the provider answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ConnectorError::ProviderUnavailable { status, .. } => *status,
            ConnectorError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
