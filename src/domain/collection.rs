use crate::error::{ConnectorError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Length of the international prefix (`+256`) stripped from payer identifiers.
const COUNTRY_PREFIX_LEN: usize = 4;

/// Country and currency the provider expects in the `X-Country` / `X-Currency`
/// headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub country: String,
    pub currency: String,
}

/// Payment instruction sent to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub reference: String,
    pub subscriber: Subscriber,
    pub transaction: CollectionTransaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub country: String,
    pub currency: String,
    pub msisdn: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionTransaction {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub country: String,
    pub currency: String,
    pub id: String,
}

impl CollectionRequest {
    /// Translates the orchestrator's channel request into a provider instruction.
    ///
    /// `country_codes` maps lowercase currency codes to the country the provider
    /// wants alongside them.
    pub fn from_channel_request(
        channel_request: &Value,
        transaction_id: &str,
        reference: &str,
        country_codes: &HashMap<String, String>,
    ) -> Result<Self> {
        let market = market_for(channel_request, country_codes)?;

        let amount = channel_request
            .pointer("/amount/amount")
            .ok_or_else(|| missing("amount.amount"))
            .and_then(|v| {
                <Decimal as Deserialize>::deserialize(v)
                    .map_err(|e| ConnectorError::InvalidJob(format!("amount.amount: {}", e)))
            })?;

        let party = channel_request
            .pointer("/payer/partyIdInfo/partyIdentifier")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("payer.partyIdInfo.partyIdentifier"))?;
        let msisdn = party
            .get(COUNTRY_PREFIX_LEN..)
            .and_then(|local| local.parse::<u64>().ok())
            .ok_or_else(|| {
                ConnectorError::InvalidJob(format!("unusable party identifier '{}'", party))
            })?;

        Ok(Self {
            reference: reference.to_string(),
            subscriber: Subscriber {
                country: market.country.clone(),
                currency: market.currency.clone(),
                msisdn,
            },
            transaction: CollectionTransaction {
                amount,
                country: market.country,
                currency: market.currency,
                id: transaction_id.to_string(),
            },
        })
    }

    pub fn market(&self) -> Market {
        Market {
            country: self.transaction.country.clone(),
            currency: self.transaction.currency.clone(),
        }
    }
}

/// Resolves the provider market from `amount.currency` of a channel request.
pub fn market_for(channel_request: &Value, country_codes: &HashMap<String, String>) -> Result<Market> {
    let currency = channel_request
        .pointer("/amount/currency")
        .and_then(Value::as_str)
        .ok_or_else(|| missing("amount.currency"))?;
    let country = country_codes
        .get(&currency.to_lowercase())
        .ok_or_else(|| ConnectorError::InvalidJob(format!("no country mapped for {}", currency)))?;

    Ok(Market {
        country: country.clone(),
        currency: currency.to_string(),
    })
}

fn missing(field: &str) -> ConnectorError {
    ConnectorError::InvalidJob(format!("channel request is missing {}", field))
}
