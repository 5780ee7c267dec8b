use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{PurchasedResource, ResourceStatus, Transaction, UnattributedPayment, Wallet};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// Read-only queries over wallets, transactions and purchased resources.
///
/// The one exception is [`AccountManagement::update_resource_status`], which applies out-of-band status
/// information from the upstream provider. Resource status is not a financial field, so those updates are
/// last-write-wins and do not go through the atomic units in [`crate::traits::LedgerDatabase`].
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the wallet for the given owner. If no wallet exists, `None` is returned.
    async fn fetch_wallet(&self, owner_id: &str) -> Result<Option<Wallet>, AccountApiError>;

    /// Returns every wallet registered with the given email address (case-insensitive). Callers must treat more
    /// than one match as ambiguous.
    async fn fetch_wallets_by_email(&self, email: &str) -> Result<Vec<Wallet>, AccountApiError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, AccountApiError>;

    /// Fetches the transaction with the given external reference for a source (gateway name or provider).
    async fn fetch_transaction_by_reference(
        &self,
        source: &str,
        reference: &str,
    ) -> Result<Option<Transaction>, AccountApiError>;

    /// Transactions for the owner, newest first.
    async fn fetch_transactions_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AccountApiError>;

    /// Pending deposits created before `created_before`, oldest first.
    async fn fetch_pending_deposits(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, AccountApiError>;

    /// Pending purchase reservations created before `created_before`.
    async fn fetch_stale_reservations(&self, created_before: DateTime<Utc>) -> Result<Vec<Transaction>, AccountApiError>;

    async fn fetch_resource(&self, id: i64) -> Result<Option<PurchasedResource>, AccountApiError>;

    /// Resources for the owner, newest first.
    async fn fetch_resources_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchasedResource>, AccountApiError>;

    /// Resources that still need status polling (`active` or `unknown`), least recently updated first.
    async fn fetch_resources_to_poll(&self, limit: i64) -> Result<Vec<PurchasedResource>, AccountApiError>;

    /// Records the latest upstream status and messages for a resource. A resource that has already been refunded is
    /// never moved back out of `refunded`. Returns the updated record, or `None` if the update did not apply.
    async fn update_resource_status(
        &self,
        id: i64,
        status: ResourceStatus,
        messages: Option<String>,
    ) -> Result<Option<PurchasedResource>, AccountApiError>;

    async fn fetch_unattributed_payment_by_id(&self, id: i64) -> Result<Option<UnattributedPayment>, AccountApiError>;

    async fn fetch_unattributed_payment(
        &self,
        source: &str,
        reference: &str,
    ) -> Result<Option<UnattributedPayment>, AccountApiError>;

    async fn fetch_unattributed_payments(&self, include_resolved: bool)
        -> Result<Vec<UnattributedPayment>, AccountApiError>;
}
