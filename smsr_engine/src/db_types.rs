use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
pub use smsr_common::MicroUsd;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------       Wallet          ---------------------------------------------------------
/// A customer's stored-value balance. There is exactly one wallet per owner.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub owner_id: String,
    /// The email address the owner registered with. Used to attribute payments that carry no owner token.
    pub email: Option<String>,
    pub balance: MicroUsd,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    GatewayKind        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Card processor
    Card,
    /// Bank transfer / USSD processor
    Bank,
    /// Cryptocurrency processor
    Crypto,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Card => "card",
            GatewayKind::Bank => "bank",
            GatewayKind::Crypto => "crypto",
        }
    }
}

impl Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "crypto" => Ok(Self::Crypto),
            s => Err(ConversionError(format!("Invalid gateway: {s}"))),
        }
    }
}

/// The `source` value for transactions originating from the upstream number provider.
pub const PROVIDER_SOURCE: &str = "provider";
/// The `source` value for refunds of purchased resources. The external reference is the upstream id.
pub const REFUND_SOURCE: &str = "provider_refund";
/// The `source` value for credits an operator applied from the unattributed payments queue. The external reference
/// is `<gateway>:<gateway reference>`.
pub const MANUAL_SOURCE: &str = "manual_attribution";

pub fn manual_attribution_reference(source: &str, reference: &str) -> String {
    format!("{source}:{reference}")
}

//--------------------------------------  TransactionKind      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Purchase,
    Refund,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
            TransactionKind::Purchase => write!(f, "purchase"),
            TransactionKind::Refund => write!(f, "refund"),
        }
    }
}

//--------------------------------------  TransactionStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Initiated but not yet settled. Purchase reservations also sit in this state.
    Pending,
    /// Settled. A completed transaction has been applied to the wallet balance exactly once.
    Completed,
    /// Terminally failed. The failure reason is recorded on the transaction.
    Failed,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

//--------------------------------------     FailureReason     ---------------------------------------------------------
/// Terminal failure reasons reported by a payment gateway, normalised across gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    Failed,
    Cancelled,
    Expired,
    WrongAmount,
    SystemFailure,
    RefundFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Failed => "failed",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Expired => "expired",
            FailureReason::WrongAmount => "wrong-amount",
            FailureReason::SystemFailure => "system-failure",
            FailureReason::RefundFailure => "refund-failure",
        }
    }

    /// The fixed, human-readable explanation shown to customers.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::Failed => "Payment failed.",
            FailureReason::Cancelled => "Payment cancelled.",
            FailureReason::Expired => "Payment expired.",
            FailureReason::WrongAmount => "Payment amount did not match.",
            FailureReason::SystemFailure => "Payment could not be processed by the gateway.",
            FailureReason::RefundFailure => "Refund failed at the gateway.",
        }
    }
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "wrong-amount" => Ok(Self::WrongAmount),
            "system-failure" => Ok(Self::SystemFailure),
            "refund-failure" => Ok(Self::RefundFailure),
            s => Err(ConversionError(format!("Invalid failure reason: {s}"))),
        }
    }
}

//--------------------------------------      Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner_id: String,
    pub kind: TransactionKind,
    /// Signed amount. Credits are positive, debits are negative.
    pub amount: MicroUsd,
    pub status: TransactionStatus,
    /// The gateway name for deposits, or [`PROVIDER_SOURCE`] / [`REFUND_SOURCE`] for purchases and refunds.
    pub source: String,
    /// Gateway payment reference or upstream order id. Unique per source.
    pub external_reference: String,
    pub description: String,
    pub failure_reason: Option<String>,
    /// Gateway-specific JSON payload
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn failure(&self) -> Option<FailureReason> {
        let reason = self.failure_reason.as_ref()?;
        match reason.parse() {
            Ok(r) => Some(r),
            Err(_) => {
                error!("Transaction {} has an unrecognised failure reason '{reason}'. Reporting it as failed", self.id);
                Some(FailureReason::Failed)
            },
        }
    }
}

//--------------------------------------      NewDeposit       ---------------------------------------------------------
/// A deposit the customer has started but the gateway has not yet settled.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub owner_id: String,
    pub gateway: GatewayKind,
    pub reference: String,
    /// The amount the customer asked to pay, converted to the ledger currency. Informational only: the gateway's
    /// settled amount is what gets credited.
    pub requested_amount: MicroUsd,
    pub description: String,
    pub metadata: Option<String>,
}

//--------------------------------------     CreditRequest     ---------------------------------------------------------
/// A fully verified, owner-resolved and converted payment, ready to be applied to a wallet.
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub owner_id: String,
    pub source: String,
    pub reference: String,
    pub amount: MicroUsd,
    pub description: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CreditResult {
    /// The wallet was credited by this call.
    Credited { transaction: Transaction, balance: MicroUsd },
    /// A completed transaction for this reference already existed. Nothing was changed.
    AlreadyProcessed(Transaction),
    /// The reference was already terminally failed. Nothing was changed.
    PreviouslyFailed(Transaction),
}

//--------------------------------------    NewReservation     ---------------------------------------------------------
/// A hold on wallet funds taken before the upstream provider is asked for a number.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub owner_id: String,
    /// The (positive) amount to hold
    pub amount: MicroUsd,
    pub description: String,
    pub metadata: Option<String>,
}

//--------------------------------------    ResourceStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Provisioned and waiting for messages
    Active,
    /// The activation was used and closed
    Completed,
    /// The number lapsed without being completed
    Expired,
    /// Cancelled upstream
    Cancelled,
    /// Cancelled and the cost returned to the wallet
    Refunded,
    /// The upstream reported a status we do not recognise
    Unknown,
}

impl ResourceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResourceStatus::Active | ResourceStatus::Unknown)
    }
}

impl Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Active => write!(f, "active"),
            ResourceStatus::Completed => write!(f, "completed"),
            ResourceStatus::Expired => write!(f, "expired"),
            ResourceStatus::Cancelled => write!(f, "cancelled"),
            ResourceStatus::Refunded => write!(f, "refunded"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

//--------------------------------------   PurchasedResource   ---------------------------------------------------------
/// A phone number provisioned by the upstream provider on behalf of a customer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PurchasedResource {
    pub id: i64,
    pub owner_id: String,
    pub upstream_id: String,
    /// The completed purchase transaction that paid for this resource
    pub transaction_id: i64,
    pub service: String,
    pub country: String,
    /// The phone number
    pub resource_value: String,
    pub status: ResourceStatus,
    pub cost: MicroUsd,
    /// JSON array of [`SmsMessage`](crate::traits::SmsMessage) received so far
    pub messages: Option<String>,
    pub expiry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub upstream_id: String,
    pub service: String,
    pub country: String,
    pub resource_value: String,
    pub expiry_at: DateTime<Utc>,
}

//--------------------------------------  UnattributedPayment  ---------------------------------------------------------
/// Money the gateway confirmed as received, but which could not be attributed to a wallet. These wait for an
/// operator to assign them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UnattributedPayment {
    pub id: i64,
    pub source: String,
    pub external_reference: String,
    /// The gateway's settled amount in minor units of `currency`
    pub gateway_amount: i64,
    pub currency: String,
    /// The converted amount, if conversion was possible
    pub amount: Option<MicroUsd>,
    pub customer_email: Option<String>,
    pub reason: String,
    pub raw: Option<String>,
    pub resolved_owner_id: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUnattributedPayment {
    pub source: String,
    pub external_reference: String,
    pub gateway_amount: i64,
    pub currency: String,
    pub amount: Option<MicroUsd>,
    pub customer_email: Option<String>,
    pub reason: String,
    pub raw: Option<String>,
}
