use crate::infrastructure::airtel::{AirtelSettings, GrantCredentials};
use crate::infrastructure::zeebe::ZeebeSettings;
use crate::interfaces::worker::WorkerSettings;
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Airtel Money collection connector: job workers for the collection process and
/// the provider's callback endpoint.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[arg(long, env = "AIRTEL_BASE_URL", default_value = "https://openapiuat.airtel.africa")]
    pub airtel_base_url: String,

    #[arg(long, env = "AIRTEL_AUTH_PATH", default_value = "/auth/oauth2/token")]
    pub airtel_auth_path: String,

    #[arg(long, env = "AIRTEL_COLLECTION_PATH", default_value = "/merchant/v1/payments/")]
    pub airtel_collection_path: String,

    #[arg(long, env = "AIRTEL_STATUS_PATH", default_value = "/standard/v1/payments")]
    pub airtel_status_path: String,

    #[arg(long, env = "AIRTEL_CLIENT_ID")]
    pub airtel_client_id: String,

    #[arg(long, env = "AIRTEL_CLIENT_SECRET", hide_env_values = true)]
    pub airtel_client_secret: String,

    #[arg(long, env = "AIRTEL_GRANT_TYPE", default_value = "client_credentials")]
    pub airtel_grant_type: String,

    /// Timeout for every provider HTTP call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Number of status polls before a pending transaction is given up
    #[arg(long, env = "MAX_RETRY_COUNT", default_value_t = 3)]
    pub max_retry_count: u32,

    #[arg(long, env = "ZEEBE_REST_URL", default_value = "http://localhost:8080")]
    pub zeebe_rest_url: String,

    /// Time-to-live of published outcome messages, in milliseconds
    #[arg(long, env = "MESSAGE_TTL_MS", default_value_t = 300_000)]
    pub message_ttl_ms: u64,

    /// Jobs each worker processes at the same time
    #[arg(long, env = "WORKER_MAX_JOBS", default_value_t = 10)]
    pub worker_max_jobs: u32,

    #[arg(long, env = "WORKER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub worker_poll_interval_ms: u64,

    #[arg(long, env = "JOB_TIMEOUT_MS", default_value_t = 300_000)]
    pub job_timeout_ms: u64,

    /// Address of the callback server
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Comma separated `currency=country` pairs
    #[arg(long, env = "COUNTRY_CODES", default_value = "kes=KE,ugx=UG,tzs=TZ", value_parser = parse_country_codes)]
    pub country_codes: HashMap<String, String>,

    #[arg(long, env = "COLLECTION_REFERENCE", default_value = "Payment to OAF")]
    pub collection_reference: String,

    /// Report every collection as successful without calling the provider
    #[arg(long, env = "SKIP_PROVIDER")]
    pub skip_provider: bool,

    /// How long resolved transactions are remembered, in seconds
    #[arg(long, env = "RECORD_RETENTION_SECS", default_value_t = 3600)]
    pub record_retention_secs: u64,
}

impl Config {
    pub fn airtel(&self) -> AirtelSettings {
        AirtelSettings {
            base_url: self.airtel_base_url.clone(),
            auth_path: self.airtel_auth_path.clone(),
            collection_path: self.airtel_collection_path.clone(),
            status_path: self.airtel_status_path.clone(),
            credentials: GrantCredentials {
                client_id: self.airtel_client_id.clone(),
                client_secret: self.airtel_client_secret.clone(),
                grant_type: self.airtel_grant_type.clone(),
            },
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn zeebe(&self) -> ZeebeSettings {
        ZeebeSettings {
            rest_url: self.zeebe_rest_url.clone(),
            worker_name: env!("CARGO_PKG_NAME").to_string(),
            job_timeout: Duration::from_millis(self.job_timeout_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn worker(&self) -> WorkerSettings {
        WorkerSettings {
            max_jobs: self.worker_max_jobs,
            poll_interval: Duration::from_millis(self.worker_poll_interval_ms),
            skip_provider: self.skip_provider,
            country_codes: self.country_codes.clone(),
            collection_reference: self.collection_reference.clone(),
        }
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }

    pub fn record_retention(&self) -> Duration {
        Duration::from_secs(self.record_retention_secs)
    }

    /// Pruning runs a few times per retention window.
    pub fn prune_interval(&self) -> Duration {
        (self.record_retention() / 4).max(Duration::from_secs(1))
    }
}

/// Parses `kes=KE,ugx=UG` into a lowercase-currency keyed map.
pub fn parse_country_codes(raw: &str) -> Result<HashMap<String, String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (currency, country) = pair
                .split_once('=')
                .ok_or_else(|| format!("'{}' is not a currency=country pair", pair))?;
            let (currency, country) = (currency.trim(), country.trim());
            if currency.is_empty() || country.is_empty() {
                return Err(format!("'{}' is not a currency=country pair", pair));
            }
            Ok((currency.to_lowercase(), country.to_uppercase()))
        })
        .collect()
}
