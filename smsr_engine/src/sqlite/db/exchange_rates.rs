use sqlx::SqliteConnection;

use crate::{ledger_api::exchange_objects::ExchangeRate, traits::ExchangeRateError};

pub async fn fetch_last_rate(currency: &str, conn: &mut SqliteConnection) -> Result<ExchangeRate, ExchangeRateError> {
    let result = sqlx::query_as(
        r#"SELECT currency, rate, as_of FROM exchange_rates WHERE currency = $1
        ORDER BY datetime(as_of) DESC, id DESC LIMIT 1"#,
    )
    .bind(currency.to_ascii_uppercase())
    .fetch_optional(conn)
    .await
    .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?
    .ok_or_else(|| ExchangeRateError::RateDoesNotExist(currency.to_string()))?;
    Ok(result)
}

pub async fn set_exchange_rate(rate: &ExchangeRate, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    if rate.rate <= 0 {
        return Err(ExchangeRateError::InvalidRate(rate.rate));
    }
    sqlx::query(r#"INSERT INTO exchange_rates (currency, rate, as_of) VALUES ($1, $2, $3)"#)
        .bind(rate.currency.to_ascii_uppercase())
        .bind(rate.rate)
        .bind(rate.as_of)
        .execute(conn)
        .await
        .map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
    Ok(())
}
