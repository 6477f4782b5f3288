use crate::domain::collection::{CollectionRequest, Market};
use crate::domain::credential::AccessGrant;
use crate::domain::ports::CollectionProvider;
use crate::domain::status::ProviderResponse;
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Where the provider lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct AirtelSettings {
    pub base_url: String,
    pub auth_path: String,
    pub collection_path: String,
    pub status_path: String,
    pub credentials: GrantCredentials,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
}

/// Airtel Money open API over HTTPS.
pub struct AirtelClient {
    http: Client,
    settings: AirtelSettings,
}

impl AirtelClient {
    pub fn new(settings: AirtelSettings) -> Result<Self> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str, market: &Market) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Country", &market.country)
            .header("X-Currency", &market.currency)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ProviderResponse> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        debug!(status, body = %body, "Provider responded");
        Ok(ProviderResponse::new(status, body))
    }
}

/// Maps reqwest failures onto the provider error kinds.
fn transport_error(e: reqwest::Error) -> ConnectorError {
    ConnectorError::ProviderUnavailable {
        status: e.status().map(|s| s.as_u16()),
        message: if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        },
    }
}

#[async_trait]
impl CollectionProvider for AirtelClient {
    async fn authenticate(&self) -> Result<AccessGrant> {
        let request = self
            .http
            .post(self.url(&self.settings.auth_path))
            .json(&self.settings.credentials);
        let response = self
            .send(request)
            .await
            .map_err(|e| ConnectorError::AuthFailure(e.to_string()))?;

        if !response.is_success() {
            return Err(ConnectorError::AuthFailure(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| ConnectorError::AuthFailure(format!("unreadable token response: {}", e)))
    }

    async fn initiate_collection(
        &self,
        token: &str,
        request: &CollectionRequest,
    ) -> Result<ProviderResponse> {
        let builder = self
            .http
            .post(self.url(&self.settings.collection_path))
            .json(request);
        self.send(self.authorized(builder, token, &request.market()))
            .await
    }

    async fn transaction_status(
        &self,
        token: &str,
        transaction_id: &str,
        market: &Market,
    ) -> Result<ProviderResponse> {
        let path = format!(
            "{}/{}",
            self.settings.status_path.trim_end_matches('/'),
            transaction_id
        );
        let builder = self.http.get(self.url(&path));
        self.send(self.authorized(builder, token, market)).await
    }
}
