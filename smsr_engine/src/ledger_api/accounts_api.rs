//! Unifies API for accessing accounts.

use std::fmt::Debug;

use log::{debug, trace};

use crate::{
    db_types::{PurchasedResource, Transaction, Wallet},
    traits::{AccountApiError, AccountManagement, LedgerDatabase, LedgerError},
};

/// The `AccountApi` provides a unified API for accessing wallets and their history.
pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches the wallet for the given owner. If no wallet exists, `None` is returned.
    pub async fn wallet(&self, owner_id: &str) -> Result<Option<Wallet>, AccountApiError> {
        self.db.fetch_wallet(owner_id).await
    }

    pub async fn transaction(&self, id: i64) -> Result<Option<Transaction>, AccountApiError> {
        self.db.fetch_transaction(id).await
    }

    /// Transactions for the owner, newest first. `limit` is capped at 500.
    pub async fn transactions(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Transaction>, AccountApiError> {
        let (limit, offset) = page(limit, offset)?;
        let transactions = self.db.fetch_transactions_for_owner(owner_id, limit, offset).await?;
        trace!("{} transactions for {owner_id}", transactions.len());
        Ok(transactions)
    }

    pub async fn resources(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchasedResource>, AccountApiError> {
        let (limit, offset) = page(limit, offset)?;
        self.db.fetch_resources_for_owner(owner_id, limit, offset).await
    }
}

impl<B> AccountApi<B>
where B: LedgerDatabase
{
    /// Creates the owner's wallet on first use and keeps the billing email current. Idempotent.
    pub async fn register_account(&self, owner_id: &str, email: Option<&str>) -> Result<Wallet, LedgerError> {
        if owner_id.trim().is_empty() {
            return Err(LedgerError::AccountError(AccountApiError::QueryError("Owner id may not be empty".into())));
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let wallet = self.db.register_wallet(owner_id, email).await?;
        debug!("Wallet for {owner_id} registered. Balance {}", wallet.balance);
        Ok(wallet)
    }
}

fn page(limit: i64, offset: i64) -> Result<(i64, i64), AccountApiError> {
    if limit <= 0 || offset < 0 {
        return Err(AccountApiError::QueryError(format!("Invalid page: limit {limit}, offset {offset}")));
    }
    Ok((limit.min(500), offset))
}
