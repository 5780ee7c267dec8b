use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smsr_common::{format_minor_units, MicroUsd};
use smsr_engine::{
    db_types::{GatewayKind, Transaction, Wallet},
    ExchangeRate,
    ReconciliationOutcome,
};

pub const QUEUED_FOR_REVIEW_MESSAGE: &str = "Payment received; it will be credited after manual review.";
const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub owner_id: String,
    /// In micro-dollars
    pub balance: MicroUsd,
    pub display: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for BalanceResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            display: wallet.balance.to_string(),
            owner_id: wallet.owner_id,
            balance: wallet.balance,
            updated_at: wallet.updated_at,
        }
    }
}

/// A request to top up the caller's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub gateway: GatewayKind,
    /// Decimal amount in `currency`, e.g. `"1500.00"`
    pub amount: String,
    /// Defaults to USD
    #[serde(default)]
    pub currency: Option<String>,
}

/// How a payment stands after a reconciliation attempt, in terms a client can show to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    /// `credited`, `already_processed`, `pending`, `failed` or `queued_for_review`
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<MicroUsd>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

impl PaymentStatusResponse {
    pub fn queued_for_review() -> Self {
        Self {
            status: "queued_for_review".into(),
            message: QUEUED_FOR_REVIEW_MESSAGE.into(),
            balance: None,
            transaction: None,
        }
    }

    pub fn pending() -> Self {
        Self::from(ReconciliationOutcome::Pending)
    }
}

impl From<ReconciliationOutcome> for PaymentStatusResponse {
    fn from(outcome: ReconciliationOutcome) -> Self {
        let message = outcome.user_message().to_string();
        let (status, balance, transaction) = match outcome {
            ReconciliationOutcome::Credited { transaction, balance } => ("credited", Some(balance), Some(transaction)),
            ReconciliationOutcome::AlreadyProcessed { transaction } => ("already_processed", None, Some(transaction)),
            ReconciliationOutcome::Pending => ("pending", None, None),
            ReconciliationOutcome::Failed { transaction, .. } => ("failed", None, transaction),
        };
        Self { status: status.into(), message, balance, transaction }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// The service the number will receive codes for, e.g. `telegram`
    pub service: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateResult {
    pub currency: String,
    /// Local currency per US dollar, as a decimal string
    pub rate: String,
    pub as_of: DateTime<Utc>,
}

impl From<ExchangeRate> for ExchangeRateResult {
    fn from(rate: ExchangeRate) -> Self {
        Self { rate: format_minor_units(rate.rate, 2), currency: rate.currency, as_of: rate.as_of }
    }
}

/// Sets the rate for a local currency by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateUpdate {
    pub currency: String,
    /// Local currency per US dollar, as a decimal string, e.g. `"1550.50"`
    pub rate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnattributedQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

/// Credits a queued payment to a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignPaymentRequest {
    pub owner_id: String,
    /// Overrides the converted amount, in US dollars as a decimal string. Required when the payment could not be
    /// converted automatically.
    #[serde(default)]
    pub amount_usd: Option<String>,
}
