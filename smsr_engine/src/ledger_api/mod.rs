//! # Ledger engine public API
//!
//! The `ledger_api` module exposes the programmatic API for the SMS reseller ledger. The API is modular, so that
//! clients can pick and choose the functionality they want.
//!
//! * [`accounts_api`] registers wallets and reads balances, transaction histories and purchased resources.
//! * [`reconciliation_api`] applies gateway-verified payments to wallets exactly once, and runs the pending deposit
//!   sweep.
//! * [`deposit_api`] opens new deposits and lets an operator clear the unattributed payments queue.
//! * [`purchase_api`] reserves funds, provisions numbers from the upstream provider, and handles cancellations,
//!   refunds and abandoned reservations.
//! * [`exchange_rate_api`] stores and serves local-currency exchange rates.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the backend traits required by the API, plus any collaborators (gateways, provider) it needs.
//!
//! ```rust,ignore
//! use smsr_engine::{AccountApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/smsr.db", 5).await?;
//! let api = AccountApi::new(db);
//! let wallet = api.wallet("user-42").await?;
//! ```

pub mod accounts_api;
pub mod deposit_api;
pub mod errors;
pub mod exchange_objects;
pub mod exchange_rate_api;
pub mod purchase_api;
pub mod purchase_objects;
pub mod reconciliation_api;
pub mod reconciliation_objects;
