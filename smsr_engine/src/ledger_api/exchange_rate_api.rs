//! Storage and lookup of local-currency exchange rates.

use std::fmt::Debug;

use log::*;

use crate::{
    ledger_api::exchange_objects::ExchangeRate,
    traits::{ExchangeRateError, ExchangeRates},
};

pub struct ExchangeRateApi<B> {
    db: B,
}

impl<B> Debug for ExchangeRateApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeRateApi")
    }
}

impl<B> ExchangeRateApi<B>
where B: ExchangeRates
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The most recent rate for `currency`. US dollars always convert at par.
    pub async fn fetch_last_rate(&self, currency: &str) -> Result<ExchangeRate, ExchangeRateError> {
        if currency.eq_ignore_ascii_case(smsr_common::USD_CURRENCY_CODE) {
            return Ok(ExchangeRate::usd());
        }
        self.db.fetch_last_rate(currency).await
    }

    pub async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        if rate.rate <= 0 {
            warn!("💱️ Refusing to store non-positive exchange rate {}", rate.rate);
            return Err(ExchangeRateError::InvalidRate(rate.rate));
        }
        self.db.set_exchange_rate(rate).await?;
        info!("💱️ Exchange rate updated: {rate}");
        Ok(())
    }
}
