use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{header::HeaderMap, Method};
use serde::Deserialize;
use serde_json::Value;
use smsr_common::USD_CURRENCY_CODE;
use smsr_engine::ExchangeRate;

use crate::{config::FxConfig, helpers::decimal_to_minor_units, rest::RestClient, ClientError};

#[derive(Debug, Clone, Deserialize)]
struct LatestRates {
    result: String,
    base_code: String,
    time_last_update_unix: Option<i64>,
    #[serde(default)]
    rates: HashMap<String, Value>,
}

/// Reads USD exchange rates from an open FX feed.
#[derive(Clone)]
pub struct FxClient {
    rest: RestClient,
}

impl FxClient {
    pub fn new(config: FxConfig, timeout: Duration) -> Result<Self, ClientError> {
        let rest = RestClient::new(&config.api_url, HeaderMap::new(), timeout)?;
        Ok(Self { rest })
    }

    /// Fetches the price of one US dollar in `currency`, in minor units of `currency`.
    pub async fn fetch_rate(&self, currency: &str) -> Result<ExchangeRate, ClientError> {
        let currency = currency.to_ascii_uppercase();
        let path = format!("/latest/{USD_CURRENCY_CODE}");
        let latest = self.rest.rest_query::<LatestRates, ()>(Method::GET, &path, &[], None).await?;
        if latest.result != "success" || latest.base_code != USD_CURRENCY_CODE {
            return Err(ClientError::JsonError(format!(
                "Unexpected FX response: result={}, base={}",
                latest.result, latest.base_code
            )));
        }
        let quoted = latest
            .rates
            .get(&currency)
            .ok_or_else(|| ClientError::JsonError(format!("The FX feed has no rate for {currency}")))?;
        let rate = decimal_to_minor_units(quoted, 2)?;
        if rate <= 0 {
            return Err(ClientError::InvalidCurrencyAmount(format!("{currency} rate {quoted}")));
        }
        let as_of = latest.time_last_update_unix.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0));
        let rate = ExchangeRate::new(&currency, rate, as_of);
        debug!("💱️ Fetched {rate}");
        Ok(rate)
    }
}
