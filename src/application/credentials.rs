use crate::domain::credential::Credential;
use crate::domain::ports::ProviderRef;
use crate::error::Result;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Process-wide cache of the provider's bearer token.
///
/// Readers share the current credential; an expired credential is refreshed by
/// exactly one caller while the others wait on the refresh lock and then pick up
/// the new value.
pub struct CredentialCache {
    provider: ProviderRef,
    current: RwLock<Option<Credential>>,
    refresh: Mutex<()>,
}

impl CredentialCache {
    pub fn new(provider: ProviderRef) -> Self {
        Self {
            provider,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Starts from a known credential instead of an empty cache.
    pub fn with_credential(provider: ProviderRef, credential: Credential) -> Self {
        Self {
            provider,
            current: RwLock::new(Some(credential)),
            refresh: Mutex::new(()),
        }
    }

    /// Returns a token valid at call time, refreshing first if needed.
    ///
    /// A failed refresh leaves the previous credential in place.
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Someone else may have refreshed while we waited.
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        info!("Access token expired or not present, fetching a new one");
        let grant = self.provider.authenticate().await.inspect_err(|e| {
            warn!(error = %e, "Access token fetch unsuccessful");
        })?;

        let credential = Credential::from_grant(grant, Utc::now());
        let token = credential.token().to_string();
        info!(expires_at = %credential.expires_at(), "Access token refreshed");
        *self.current.write().await = Some(credential);
        Ok(token)
    }

    /// Snapshot of the cached credential, valid or not.
    pub async fn current(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    async fn valid_token(&self) -> Option<String> {
        let now = Utc::now();
        self.current
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_valid(now))
            .map(|c| c.token().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::infrastructure::in_memory::StubProvider;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_expired_credential_refreshes_once() {
        let provider = Arc::new(StubProvider::new());
        provider.push_grant("fresh", 3600);
        let cache = CredentialCache::with_credential(
            provider.clone(),
            Credential::new("stale", Utc::now() - Duration::seconds(1)),
        );

        assert_eq!(cache.token().await.unwrap(), "fresh");
        assert_eq!(provider.auth_calls(), 1);

        // Warm now.
        assert_eq!(cache.token().await.unwrap(), "fresh");
        assert_eq!(provider.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_valid_credential_makes_no_call() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::with_credential(
            provider.clone(),
            Credential::new("warm", Utc::now() + Duration::hours(1)),
        );

        assert_eq!(cache.token().await.unwrap(), "warm");
        assert_eq!(provider.auth_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_credential() {
        let provider = Arc::new(StubProvider::new());
        provider.push_auth_failure("401 invalid_client");
        let stale = Credential::new("stale", Utc::now() - Duration::seconds(1));
        let cache = CredentialCache::with_credential(provider.clone(), stale.clone());

        let result = cache.token().await;
        assert!(matches!(result, Err(ConnectorError::AuthFailure(_))));
        assert_eq!(cache.current().await, Some(stale));
        assert_eq!(provider.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let provider = Arc::new(StubProvider::new());
        provider.push_grant("shared", 3600);
        let cache = Arc::new(CredentialCache::new(provider.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(provider.auth_calls(), 1);
    }
}
