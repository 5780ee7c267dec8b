use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smsr_common::{format_minor_units, MicroUsd, MICROS_PER_USD, USD_CURRENCY_CODE};
use sqlx::FromRow;

/// The price of one US dollar in a local currency.
///
/// Conversion is pure integer arithmetic on minor units (kobo, cents, ...) with half-up rounding. A rate never
/// changes an amount that has already been stored; it is only applied at the moment a payment is converted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    /// How many minor units of `currency` buy one US dollar. E.g. 155_000 for ₦1,550.00/$
    pub rate: i64,
    pub as_of: DateTime<Utc>,
}

fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let q = numerator.div_euclid(denominator);
    let r = numerator.rem_euclid(denominator);
    if 2 * r >= denominator {
        q + 1
    } else {
        q
    }
}

impl ExchangeRate {
    /// Create a new ExchangeRate object
    ///
    /// *NB* The rate is in minor units of the local currency per US dollar.
    pub fn new(currency: &str, rate: i64, as_of: Option<DateTime<Utc>>) -> Self {
        let as_of = as_of.unwrap_or_else(Utc::now);
        Self { currency: currency.to_ascii_uppercase(), rate, as_of }
    }

    /// The identity rate for US dollars quoted in cents.
    pub fn usd() -> Self {
        Self::new(USD_CURRENCY_CODE, 100, None)
    }

    /// Convert an amount in minor units of the local currency to the ledger currency.
    pub fn to_micro_usd(&self, minor_units: i64) -> MicroUsd {
        let micros = div_round_half_up(i128::from(minor_units) * i128::from(MICROS_PER_USD), i128::from(self.rate));
        MicroUsd::from(clamp_i64(micros))
    }

    /// Convert a ledger amount to minor units of the local currency.
    pub fn from_micro_usd(&self, amount: MicroUsd) -> i64 {
        let minor = div_round_half_up(i128::from(amount.value()) * i128::from(self.rate), i128::from(MICROS_PER_USD));
        clamp_i64(minor)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_i64(v: i128) -> i64 {
    if v > i128::from(i64::MAX) {
        i64::MAX
    } else if v < i128::from(i64::MIN) {
        i64::MIN
    } else {
        v as i64
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1 USD => {} {} (as of {})", format_minor_units(self.rate, 2), self.currency, self.as_of)
    }
}
