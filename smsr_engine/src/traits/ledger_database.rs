use thiserror::Error;

use crate::{
    db_types::{
        CreditRequest,
        CreditResult,
        FailureReason,
        MicroUsd,
        NewDeposit,
        NewReservation,
        NewResource,
        NewUnattributedPayment,
        PurchasedResource,
        Transaction,
        UnattributedPayment,
        Wallet,
    },
    traits::{AccountApiError, AccountManagement, ExchangeRates},
};

/// This trait defines the money-moving behaviour for backends supporting the ledger engine.
///
/// Every method that changes a wallet balance does so in a single atomic unit together with the transaction record
/// that explains the change. Backends must enforce the following at the storage level, not in application code:
/// * A wallet balance can never be negative. A debit that would overdraw the wallet is rejected with
///   [`LedgerError::InsufficientFunds`] and nothing in the unit is applied.
/// * For a given `(source, external_reference)` there is at most one transaction, and it transitions out of
///   `pending` at most once. This is what makes crediting idempotent under concurrent webhook deliveries.
/// * A `completed` purchase transaction is always written in the same unit as the resource it paid for.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone + AccountManagement + ExchangeRates {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates the wallet for `owner_id` with a zero balance if it does not exist yet. If `email` is given, it
    /// replaces the stored email. This call is idempotent and returns the current wallet.
    async fn register_wallet(&self, owner_id: &str, email: Option<&str>) -> Result<Wallet, LedgerError>;

    /// Stores a `pending` deposit transaction for a payment the customer is about to make.
    ///
    /// Fails with [`LedgerError::AlreadyExists`] if the reference is already in use for this gateway.
    async fn insert_pending_deposit(&self, deposit: NewDeposit) -> Result<Transaction, LedgerError>;

    /// Applies a verified payment to a wallet, in a single atomic unit:
    /// * makes sure a transaction row exists for `(source, reference)`,
    /// * moves it from `pending` to `completed` with the settled amount and owner,
    /// * increments the wallet balance by the same amount.
    ///
    /// If the transaction is already `completed`, nothing is changed and [`CreditResult::AlreadyProcessed`] is
    /// returned. If it was already `failed`, [`CreditResult::PreviouslyFailed`] is returned.
    async fn credit_deposit(&self, credit: CreditRequest) -> Result<CreditResult, LedgerError>;

    /// Marks a `pending` deposit as failed with the given reason. Returns the updated transaction, or `None` if there
    /// is no pending deposit for the reference (it may already be completed or failed).
    async fn fail_deposit(
        &self,
        source: &str,
        reference: &str,
        reason: FailureReason,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Takes a hold on wallet funds ahead of an upstream purchase. The wallet is debited by `amount` and a `pending`
    /// purchase transaction is written, in one atomic unit.
    ///
    /// Fails with [`LedgerError::InsufficientFunds`] if the balance does not cover the amount at the time of the write.
    async fn reserve_funds(&self, reservation: NewReservation) -> Result<Transaction, LedgerError>;

    /// Converts a reservation into a completed purchase. In one atomic unit the reservation transaction is marked
    /// `completed` and re-referenced to the upstream id, and the resource row is inserted as `active`.
    ///
    /// Returns the completed transaction, the new resource and the current wallet balance.
    async fn commit_purchase(
        &self,
        reservation_id: i64,
        resource: NewResource,
    ) -> Result<(Transaction, PurchasedResource, MicroUsd), LedgerError>;

    /// Releases a reservation: the transaction is marked `failed` with `reason` and the held amount is returned to
    /// the wallet. Returns `None` if the reservation is no longer pending (already committed or released).
    async fn release_reservation(&self, reservation_id: i64, reason: &str) -> Result<Option<Transaction>, LedgerError>;

    /// Returns the cost of a resource to its owner. In one atomic unit, the resource is marked `refunded`, a
    /// completed refund transaction referencing the upstream id is written, and the wallet is credited.
    ///
    /// A resource can be refunded at most once. Returns `None` if it was already refunded.
    async fn refund_resource(
        &self,
        resource_id: i64,
        reason: &str,
    ) -> Result<Option<(Transaction, PurchasedResource, MicroUsd)>, LedgerError>;

    /// Stores a paid-but-unattributed payment for manual review. Idempotent by `(source, external_reference)`: if the
    /// payment has already been recorded, the existing record is returned.
    async fn record_unattributed_payment(
        &self,
        payment: NewUnattributedPayment,
    ) -> Result<UnattributedPayment, LedgerError>;

    /// Assigns an unattributed payment to an owner and credits their wallet through the same path as
    /// [`LedgerDatabase::credit_deposit`]. The record is marked resolved in the same atomic unit.
    async fn assign_unattributed_payment(
        &self,
        id: i64,
        owner_id: &str,
        amount: MicroUsd,
    ) -> Result<CreditResult, LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    AccountError(#[from] AccountApiError),
    #[error("No wallet exists for owner {0}")]
    WalletNotFound(String),
    #[error("Insufficient funds. Balance is {balance} but {required} is required")]
    InsufficientFunds { balance: MicroUsd, required: MicroUsd },
    #[error("A transaction for {0} already exists")]
    AlreadyExists(String),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(String),
    #[error("The requested resource {0} does not exist")]
    ResourceNotFound(i64),
    #[error("The requested unattributed payment {0} does not exist")]
    UnattributedPaymentNotFound(i64),
    #[error("Illegal state change. {0}")]
    InvalidStateTransition(String),
}

impl LedgerError {
    /// The amount the customer is short by, if this is an insufficient funds error.
    pub fn shortfall(&self) -> Option<MicroUsd> {
        match self {
            LedgerError::InsufficientFunds { balance, required } => Some(*required - *balance),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
