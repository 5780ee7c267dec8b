//! #  Backend and collaborator contracts
//!
//! This module defines the interfaces the ledger engine depends on. Nothing in the engine talks to a concrete
//! database, payment gateway or number provider directly. Implementations are constructed once at startup and
//! handed to the APIs in [`crate::ledger_api`].
//!
//! ## Wallets and the ledger
//! A wallet holds a customer's balance in the canonical ledger currency. Every change to a balance is accompanied by a
//! [`Transaction`](crate::db_types::Transaction) record written in the same atomic unit.
//!
//! ## Traits
//! * [`LedgerDatabase`] defines the atomic, money-moving operations a backend must provide: crediting verified
//!   deposits, reserving and committing purchase funds, refunds and manual attribution.
//! * [`AccountManagement`] provides read-only queries over wallets, transactions and resources, plus the
//!   last-write-wins resource status updates used by background polling.
//! * [`ExchangeRates`] stores and retrieves local-currency exchange rates.
//! * [`PaymentGateway`] is the contract each payment processor adapter satisfies: webhook authenticity checks and the
//!   authoritative server-to-server payment lookup.
//! * [`NumberProvider`] is the contract for the upstream phone-number provider.
mod account_management;
mod exchange_rates;
mod ledger_database;
mod number_provider;
mod payment_gateway;

pub use account_management::{AccountApiError, AccountManagement};
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use ledger_database::{LedgerDatabase, LedgerError};
pub use number_provider::{NumberProvider, NumberRequest, ProviderError, ProvisionedNumber, SmsMessage, UpstreamStatus};
pub use payment_gateway::{
    CheckoutRequest,
    CheckoutSession,
    GatewayError,
    PaymentGateway,
    PaymentGroundTruth,
    SettlementStatus,
};
