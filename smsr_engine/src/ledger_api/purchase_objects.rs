use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::db_types::{MicroUsd, PurchasedResource, Transaction};

/// Retail pricing and lifetime rules for purchased numbers.
#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    /// Markup over the wholesale price, in basis points. 2500 = 25%
    pub markup_bps: u32,
    /// How long a number stays usable when the provider does not say
    pub activation_lifetime: Duration,
    /// Reservations older than this are assumed abandoned. Must comfortably exceed the provider HTTP timeout.
    pub reservation_timeout: Duration,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            markup_bps: 2500,
            activation_lifetime: Duration::minutes(20),
            reservation_timeout: Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub transaction: Transaction,
    pub resource: PurchasedResource,
    /// Wallet balance after the charge
    pub balance: MicroUsd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund: Transaction,
    pub resource: PurchasedResource,
    pub balance: MicroUsd,
}

/// Tally of one pass of the resource status poller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePollSummary {
    pub checked: usize,
    pub updated: usize,
    pub refunded: usize,
    pub errors: usize,
}
