use thiserror::Error;

use crate::{
    db_types::MicroUsd,
    traits::{AccountApiError, ExchangeRateError, GatewayError, LedgerError, ProviderError},
};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    /// Transient. Retry with backoff; the payment itself may be fine.
    #[error("The payment gateway is unavailable: {0}")]
    GatewayUnavailable(String),
    /// Transient. The gateway may not have propagated the payment yet.
    #[error("The payment reference {0} is not known")]
    ReferenceNotFound(String),
    /// Funds were received, but no wallet could be identified. The payment is queued for manual attribution.
    #[error("Could not determine which wallet payment {reference} belongs to: {reason}")]
    OwnerResolutionFailed { reference: String, reason: String, unattributed_id: i64 },
    /// Funds were received in a currency that cannot be converted. The payment is queued for manual attribution.
    #[error("Could not convert payment {reference} to the ledger currency: {reason}")]
    ConversionFailed { reference: String, reason: String, unattributed_id: i64 },
    #[error("The gateway returned an unusable response: {0}")]
    InvalidGatewayResponse(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Account query error: {0}")]
    Account(#[from] AccountApiError),
}

impl ReconciliationError {
    /// Whether calling again later may succeed without any intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconciliationError::GatewayUnavailable(_) | ReconciliationError::ReferenceNotFound(_))
    }
}

impl From<GatewayError> for ReconciliationError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::GatewayUnavailable(s) => ReconciliationError::GatewayUnavailable(s),
            GatewayError::ReferenceNotFound(s) => ReconciliationError::ReferenceNotFound(s),
            e => ReconciliationError::InvalidGatewayResponse(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DepositError {
    #[error("Deposit amounts must be at least {minimum}")]
    AmountTooSmall { minimum: MicroUsd },
    #[error("Deposits in {0} are not supported")]
    UnsupportedCurrency(String),
    #[error("No wallet exists for owner {0}")]
    WalletNotFound(String),
    #[error("Unattributed payment #{0} could not be converted automatically. An amount must be given")]
    AmountRequired(i64),
    #[error("No exchange rate is available: {0}")]
    ExchangeRate(#[from] ExchangeRateError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Account query error: {0}")]
    Account(#[from] AccountApiError),
}

#[derive(Debug, Clone, Error)]
pub enum PurchaseError {
    #[error("Insufficient balance. {shortfall} more is needed")]
    InsufficientFunds { balance: MicroUsd, charge: MicroUsd, shortfall: MicroUsd },
    /// No charge was applied. The provider error is kept for the logs only.
    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(ProviderError),
    #[error("No wallet exists for owner {0}")]
    WalletNotFound(String),
    #[error("Resource {0} does not exist")]
    ResourceNotFound(i64),
    #[error("The resource cannot be cancelled: {0}")]
    NotCancellable(String),
    /// The provider failed on a call that does not move money (status checks, cancellation).
    #[error("Number provider error: {0}")]
    Upstream(ProviderError),
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
    #[error("Account query error: {0}")]
    Account(#[from] AccountApiError),
}

impl From<LedgerError> for PurchaseError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { balance, required } => {
                PurchaseError::InsufficientFunds { balance, charge: required, shortfall: required - balance }
            },
            LedgerError::WalletNotFound(owner) => PurchaseError::WalletNotFound(owner),
            LedgerError::ResourceNotFound(id) => PurchaseError::ResourceNotFound(id),
            e => PurchaseError::Ledger(e),
        }
    }
}
