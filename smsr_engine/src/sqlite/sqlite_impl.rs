//! `SqliteDatabase` is a concrete implementation of a ledger engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! Every write, even a single statement, runs in its own transaction and is committed before the method returns.
//!
//! Every money-moving method opens a transaction with `pool.begin()` and issues a write as its first statement. SQLite
//! then holds the database write lock for the remainder of the unit, so concurrent units on the same wallet or the
//! same payment reference are serialised by the database itself.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::db::{db_url, exchange_rates, new_pool, resources, transactions, unattributed, wallets};
use crate::{
    db_types::{
        manual_attribution_reference,
        CreditRequest,
        CreditResult,
        FailureReason,
        MicroUsd,
        NewDeposit,
        NewReservation,
        NewResource,
        NewUnattributedPayment,
        PurchasedResource,
        ResourceStatus,
        Transaction,
        TransactionStatus,
        UnattributedPayment,
        Wallet,
        MANUAL_SOURCE,
    },
    helpers::new_reservation_reference,
    ledger_api::exchange_objects::ExchangeRate,
    traits::{
        AccountApiError,
        AccountManagement,
        ExchangeRateError,
        ExchangeRates,
        LedgerDatabase,
        LedgerError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database given by `SMSR_DATABASE_URL`, falling back to the default location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

/// The shared body of every wallet credit. Must run inside an open transaction.
async fn apply_credit(credit: CreditRequest, conn: &mut SqliteConnection) -> Result<CreditResult, LedgerError> {
    let inserted = transactions::ensure_deposit_row(&credit, conn).await?;
    if inserted {
        trace!("🗃️ No pending row existed for [{}:{}]. Created one", credit.source, credit.reference);
    }
    match transactions::complete_pending_deposit(&credit, conn).await? {
        Some(transaction) => {
            let balance = wallets::credit_wallet(&credit.owner_id, credit.amount, conn).await?;
            Ok(CreditResult::Credited { transaction, balance })
        },
        None => {
            let existing = transactions::fetch_by_reference(&credit.source, &credit.reference, conn)
                .await?
                .ok_or_else(|| LedgerError::TransactionNotFound(credit.reference.clone()))?;
            match existing.status {
                TransactionStatus::Completed => Ok(CreditResult::AlreadyProcessed(existing)),
                TransactionStatus::Failed => Ok(CreditResult::PreviouslyFailed(existing)),
                TransactionStatus::Pending => Err(LedgerError::InvalidStateTransition(format!(
                    "Transaction {} for {} could not be completed. It is a {} transaction",
                    existing.id, credit.reference, existing.kind
                ))),
            }
        },
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn register_wallet(&self, owner_id: &str, email: Option<&str>) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::upsert_wallet(owner_id, email, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Wallet for {owner_id} registered");
        Ok(wallet)
    }

    async fn insert_pending_deposit(&self, deposit: NewDeposit) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let transaction = transactions::insert_pending_deposit(deposit, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Pending deposit #{} [{}:{}] saved for {}",
            transaction.id, transaction.source, transaction.external_reference, transaction.owner_id
        );
        Ok(transaction)
    }

    async fn credit_deposit(&self, credit: CreditRequest) -> Result<CreditResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = apply_credit(credit, &mut tx).await?;
        match &result {
            CreditResult::Credited { transaction, balance } => {
                tx.commit().await?;
                debug!(
                    "🗃️ Deposit #{} credited {} to {}. New balance {balance}",
                    transaction.id, transaction.amount, transaction.owner_id
                );
            },
            CreditResult::AlreadyProcessed(t) | CreditResult::PreviouslyFailed(t) => {
                tx.rollback().await?;
                debug!("🗃️ Deposit [{}:{}] is already {}. Nothing to do", t.source, t.external_reference, t.status);
            },
        }
        Ok(result)
    }

    async fn fail_deposit(
        &self,
        source: &str,
        reference: &str,
        reason: FailureReason,
    ) -> Result<Option<Transaction>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = transactions::fail_pending_deposit(source, reference, reason, &mut tx).await?;
        tx.commit().await?;
        if let Some(t) = &result {
            debug!("🗃️ Deposit #{} [{source}:{reference}] marked as failed ({reason})", t.id);
        }
        Ok(result)
    }

    async fn reserve_funds(&self, reservation: NewReservation) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let owner_id = reservation.owner_id.clone();
        let amount = reservation.amount;
        let balance = wallets::debit_wallet(&owner_id, amount, &mut tx).await?;
        let reference = new_reservation_reference();
        let transaction = transactions::insert_reservation(reservation, &reference, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Reserved {amount} from {owner_id} as #{}. Remaining balance {balance}", transaction.id);
        Ok(transaction)
    }

    async fn commit_purchase(
        &self,
        reservation_id: i64,
        resource: NewResource,
    ) -> Result<(Transaction, PurchasedResource, MicroUsd), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let upstream_id = resource.upstream_id.clone();
        let transaction = transactions::complete_reservation(reservation_id, &upstream_id, &mut tx)
            .await?
            .ok_or_else(|| {
                LedgerError::InvalidStateTransition(format!("Reservation #{reservation_id} is not pending"))
            })?;
        let cost = -transaction.amount;
        let resource = resources::insert_resource(&transaction.owner_id, transaction.id, cost, resource, &mut tx).await?;
        let balance = wallets::fetch_wallet(&transaction.owner_id, &mut tx)
            .await?
            .map(|w| w.balance)
            .ok_or_else(|| LedgerError::WalletNotFound(transaction.owner_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ Reservation #{reservation_id} committed as purchase of {upstream_id} (resource #{})", resource.id);
        Ok((transaction, resource, balance))
    }

    async fn release_reservation(&self, reservation_id: i64, reason: &str) -> Result<Option<Transaction>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let transaction = match transactions::fail_reservation(reservation_id, reason, &mut tx).await? {
            Some(t) => t,
            None => {
                tx.rollback().await?;
                debug!("🗃️ Reservation #{reservation_id} is not pending. Nothing to release");
                return Ok(None);
            },
        };
        let balance = wallets::credit_wallet(&transaction.owner_id, -transaction.amount, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Reservation #{reservation_id} released. {} returned to {}. Balance {balance}",
            -transaction.amount, transaction.owner_id
        );
        Ok(Some(transaction))
    }

    async fn refund_resource(
        &self,
        resource_id: i64,
        reason: &str,
    ) -> Result<Option<(Transaction, PurchasedResource, MicroUsd)>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let resource = match resources::mark_refunded(resource_id, &mut tx).await? {
            Some(r) => r,
            None => {
                let exists = resources::fetch_resource(resource_id, &mut tx).await?.is_some();
                tx.rollback().await?;
                return if exists { Ok(None) } else { Err(LedgerError::ResourceNotFound(resource_id)) };
            },
        };
        let description = format!("Refund for {} ({reason})", resource.resource_value);
        let refund =
            match transactions::insert_refund(&resource.owner_id, resource.cost, &resource.upstream_id, &description, &mut tx)
                .await?
            {
                Some(t) => t,
                None => {
                    tx.rollback().await?;
                    warn!("🗃️ Resource #{resource_id} already has a refund transaction. Not refunding again");
                    return Ok(None);
                },
            };
        let balance = wallets::credit_wallet(&resource.owner_id, resource.cost, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Resource #{resource_id} refunded {} to {}. Balance {balance}", resource.cost, resource.owner_id);
        Ok(Some((refund, resource, balance)))
    }

    async fn record_unattributed_payment(
        &self,
        payment: NewUnattributedPayment,
    ) -> Result<UnattributedPayment, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = unattributed::idempotent_insert(payment, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Unattributed payment #{} [{}:{}] on file", record.id, record.source, record.external_reference);
        Ok(record)
    }

    async fn assign_unattributed_payment(
        &self,
        id: i64,
        owner_id: &str,
        amount: MicroUsd,
    ) -> Result<CreditResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = match unattributed::mark_resolved(id, owner_id, &mut tx).await? {
            Some(p) => p,
            None => {
                let existing = unattributed::fetch_payment(id, &mut tx).await?;
                tx.rollback().await?;
                return match existing {
                    Some(p) => Err(LedgerError::InvalidStateTransition(format!(
                        "Unattributed payment #{id} was already assigned to {}",
                        p.resolved_owner_id.unwrap_or_default()
                    ))),
                    None => Err(LedgerError::UnattributedPaymentNotFound(id)),
                };
            },
        };
        if wallets::fetch_wallet(owner_id, &mut tx).await?.is_none() {
            tx.rollback().await?;
            return Err(LedgerError::WalletNotFound(owner_id.to_string()));
        }
        let credit = CreditRequest {
            owner_id: owner_id.to_string(),
            source: MANUAL_SOURCE.to_string(),
            reference: manual_attribution_reference(&payment.source, &payment.external_reference),
            amount,
            description: format!("Deposit via {} (manually attributed)", payment.source),
            metadata: payment.raw.clone(),
        };
        let result = apply_credit(credit, &mut tx).await?;
        if let CreditResult::PreviouslyFailed(t) = &result {
            tx.rollback().await?;
            return Err(LedgerError::InvalidStateTransition(format!(
                "Transaction #{} for {} has failed and cannot be credited",
                t.id, t.external_reference
            )));
        }
        tx.commit().await?;
        info!("🗃️ Unattributed payment #{id} assigned to {owner_id}");
        Ok(result)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_wallet(&self, owner_id: &str) -> Result<Option<Wallet>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(owner_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn fetch_wallets_by_email(&self, email: &str) -> Result<Vec<Wallet>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = wallets::fetch_wallets_by_email(email, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction_by_reference(
        &self,
        source: &str,
        reference: &str,
    ) -> Result<Option<Transaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_by_reference(source, reference, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transactions_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_for_owner(owner_id, limit, offset, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_pending_deposits(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_pending_deposits(created_before, limit, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_stale_reservations(&self, created_before: DateTime<Utc>) -> Result<Vec<Transaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_stale_reservations(created_before, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_resource(&self, id: i64) -> Result<Option<PurchasedResource>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = resources::fetch_resource(id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_resources_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchasedResource>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = resources::fetch_for_owner(owner_id, limit, offset, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_resources_to_poll(&self, limit: i64) -> Result<Vec<PurchasedResource>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = resources::fetch_resources_to_poll(limit, &mut conn).await?;
        Ok(result)
    }

    async fn update_resource_status(
        &self,
        id: i64,
        status: ResourceStatus,
        messages: Option<String>,
    ) -> Result<Option<PurchasedResource>, AccountApiError> {
        let mut tx = self.pool.begin().await?;
        let result = resources::update_status(id, status, messages, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_unattributed_payment_by_id(&self, id: i64) -> Result<Option<UnattributedPayment>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = unattributed::fetch_payment(id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_unattributed_payment(
        &self,
        source: &str,
        reference: &str,
    ) -> Result<Option<UnattributedPayment>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = unattributed::fetch_by_reference(source, reference, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_unattributed_payments(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<UnattributedPayment>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = unattributed::fetch_payments(include_resolved, &mut conn).await?;
        Ok(result)
    }
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_last_rate(&self, currency: &str) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::fetch_last_rate(currency, &mut conn).await
    }

    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        let mut tx = self.pool.begin().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        exchange_rates::set_exchange_rate(rate, &mut tx).await?;
        tx.commit().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        debug!("🗃️ Exchange rate saved: {rate}");
        Ok(())
    }
}
