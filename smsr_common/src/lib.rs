mod amounts;
mod helpers;
mod micro_usd;

pub mod op;
mod secret;

pub use amounts::{format_minor_units, parse_decimal_amount, AmountParseError};
pub use helpers::{parse_boolean_flag, parse_env_value};
pub use micro_usd::{MicroUsd, MicroUsdConversionError, MICROS_PER_CENT, MICROS_PER_USD, USD_CURRENCY_CODE};
pub use secret::Secret;
