use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

/// A bearer token together with the instant it stops being usable.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Builds a credential from a grant issued at `issued_at`.
    pub fn from_grant(grant: AccessGrant, issued_at: DateTime<Utc>) -> Self {
        Self::new(
            grant.access_token,
            issued_at + Duration::seconds(grant.expires_in),
        )
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// Keeps tokens out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of a successful token exchange.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccessGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_boundary() {
        let now = Utc::now();
        let credential = Credential::new("abc", now);
        assert!(!credential.is_valid(now));
        assert!(credential.is_valid(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_from_grant_adds_lifetime() {
        let issued_at = Utc::now();
        let grant: AccessGrant = serde_json::from_str(
            r#"{"access_token":"tok","expires_in":180,"token_type":"bearer"}"#,
        )
        .unwrap();

        let credential = Credential::from_grant(grant, issued_at);
        assert_eq!(credential.token(), "tok");
        assert_eq!(credential.expires_at(), issued_at + Duration::seconds(180));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("secret-token", Utc::now());
        assert!(!format!("{:?}", credential).contains("secret-token"));
    }
}
