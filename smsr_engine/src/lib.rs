//! SMS reseller ledger engine
//!
//! Customers top up a stored-value wallet through one of several payment gateways and spend the balance on phone
//! numbers provisioned by an upstream provider. This library holds the money-handling core. It is agnostic of HTTP,
//! of any particular gateway and of the provider: those are reached through the traits in [`traits`].
//!
//! The library is divided into these sections:
//! 1. Storage ([`SqliteDatabase`]). Every balance change happens in one atomic unit together with the transaction
//!    that explains it. The data types are defined in [`db_types`] and are public.
//! 2. The public API ([`ledger_api`]): reconciliation of payments, deposits, purchases, accounts and exchange rates.
//! 3. Events ([`events`]). The APIs publish an event whenever money moves or a payment needs an operator's attention.
//!    A simple actor framework lets you hook into these events.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ledger_api::{
    accounts_api::AccountApi,
    deposit_api::DepositApi,
    errors::{DepositError, PurchaseError, ReconciliationError},
    exchange_objects::ExchangeRate,
    exchange_rate_api::ExchangeRateApi,
    purchase_api::PurchaseApi,
    purchase_objects::{PricingConfig, PurchaseReceipt, RefundReceipt, ResourcePollSummary},
    reconciliation_api::ReconciliationApi,
    reconciliation_objects::{DepositInitiation, PollSummary, ReconciliationOutcome},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
