use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "USD";
pub const MICROS_PER_USD: i64 = 1_000_000;
pub const MICROS_PER_CENT: i64 = 10_000;

//--------------------------------------     MicroUsd       ----------------------------------------------------------
/// The ledger's canonical money unit. One US dollar is one million `MicroUsd`.
///
/// Wallet balances, transaction amounts and resource costs are all stored in this unit. Amounts are signed: credits
/// are positive and debits are negative.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize, Hash)]
#[sqlx(transparent)]
pub struct MicroUsd(i64);

op!(binary MicroUsd, Add, add);
op!(binary MicroUsd, Sub, sub);
op!(inplace MicroUsd, AddAssign, add_assign);
op!(inplace MicroUsd, SubAssign, sub_assign);
op!(unary MicroUsd, Neg, neg);

impl Mul<i64> for MicroUsd {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MicroUsd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in MicroUsd: {0}")]
pub struct MicroUsdConversionError(String);

impl From<i64> for MicroUsd {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MicroUsd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MicroUsd {}

impl TryFrom<u64> for MicroUsd {
    type Error = MicroUsdConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MicroUsdConversionError(format!("Value {} is too large to convert to MicroUsd", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MicroUsd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = (self.0.unsigned_abs() + (MICROS_PER_CENT as u64) / 2) / MICROS_PER_CENT as u64;
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl MicroUsd {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_usd(usd: i64) -> Self {
        Self(usd * MICROS_PER_USD)
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents * MICROS_PER_CENT)
    }

    /// Whole cents, rounded half away from zero. Gateways that settle in USD expect cents.
    pub fn to_cents(&self) -> i64 {
        let half = MICROS_PER_CENT / 2;
        if self.0 >= 0 {
            (self.0 + half) / MICROS_PER_CENT
        } else {
            (self.0 - half) / MICROS_PER_CENT
        }
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}
