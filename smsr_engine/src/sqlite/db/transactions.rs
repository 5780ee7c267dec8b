use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        CreditRequest,
        FailureReason,
        MicroUsd,
        NewDeposit,
        NewReservation,
        Transaction,
        PROVIDER_SOURCE,
        REFUND_SOURCE,
    },
    traits::LedgerError,
};

fn map_unique_violation(e: sqlx::Error, reference: &str) -> LedgerError {
    match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::AlreadyExists(reference.to_string()),
        _ => LedgerError::from(e),
    }
}

pub async fn insert_pending_deposit(
    deposit: NewDeposit,
    conn: &mut SqliteConnection,
) -> Result<Transaction, LedgerError> {
    let reference = deposit.reference.clone();
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (owner_id, kind, amount, status, source, external_reference, description, metadata)
            VALUES ($1, 'deposit', $2, 'pending', $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(deposit.owner_id)
    .bind(deposit.requested_amount)
    .bind(deposit.gateway.as_str())
    .bind(deposit.reference)
    .bind(deposit.description)
    .bind(deposit.metadata)
    .fetch_one(conn)
    .await
    .map_err(|e| map_unique_violation(e, &reference))?;
    Ok(transaction)
}

/// Makes sure a deposit row exists for the credit's reference. Returns `true` if a new (pending) row was inserted.
///
/// This is always the first statement of a credit unit, so the write lock is taken before anything is read.
pub async fn ensure_deposit_row(credit: &CreditRequest, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
            INSERT INTO transactions (owner_id, kind, amount, status, source, external_reference, description, metadata)
            VALUES ($1, 'deposit', $2, 'pending', $3, $4, $5, $6)
            ON CONFLICT (source, external_reference) DO NOTHING;
        "#,
    )
    .bind(&credit.owner_id)
    .bind(credit.amount)
    .bind(&credit.source)
    .bind(&credit.reference)
    .bind(&credit.description)
    .bind(&credit.metadata)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Moves a pending deposit to `completed` with the settled amount. Returns `None` if the deposit is not pending.
pub async fn complete_pending_deposit(
    credit: &CreditRequest,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'completed',
                owner_id = $1,
                amount = $2,
                metadata = COALESCE($3, metadata),
                failure_reason = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE source = $4 AND external_reference = $5 AND kind = 'deposit' AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(&credit.owner_id)
    .bind(credit.amount)
    .bind(&credit.metadata)
    .bind(&credit.source)
    .bind(&credit.reference)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn fail_pending_deposit(
    source: &str,
    reference: &str,
    reason: FailureReason,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET status = 'failed', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE source = $2 AND external_reference = $3 AND kind = 'deposit' AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(reason.as_str())
    .bind(source)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn insert_reservation(
    reservation: NewReservation,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Transaction, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (owner_id, kind, amount, status, source, external_reference, description, metadata)
            VALUES ($1, 'purchase', $2, 'pending', $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(reservation.owner_id)
    .bind(-reservation.amount)
    .bind(PROVIDER_SOURCE)
    .bind(reference)
    .bind(reservation.description)
    .bind(reservation.metadata)
    .fetch_one(conn)
    .await
    .map_err(|e| map_unique_violation(e, reference))?;
    Ok(transaction)
}

/// Marks a pending reservation as a completed purchase of `upstream_id`. Returns `None` if the reservation is no
/// longer pending.
pub async fn complete_reservation(
    id: i64,
    upstream_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET status = 'completed', external_reference = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND kind = 'purchase' AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(upstream_id)
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_unique_violation(e, upstream_id))?;
    Ok(transaction)
}

pub async fn fail_reservation(
    id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET status = 'failed', failure_reason = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND kind = 'purchase' AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(reason)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

/// Writes a completed refund transaction. Returns `None` if a refund for `upstream_id` already exists.
pub async fn insert_refund(
    owner_id: &str,
    amount: MicroUsd,
    upstream_id: &str,
    description: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, LedgerError> {
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (owner_id, kind, amount, status, source, external_reference, description)
            VALUES ($1, 'refund', $2, 'completed', $3, $4, $5)
            ON CONFLICT (source, external_reference) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(amount)
    .bind(REFUND_SOURCE)
    .bind(upstream_id)
    .bind(description)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch_transaction(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_by_reference(
    source: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE source = $1 AND external_reference = $2")
        .bind(source)
        .bind(reference)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_for_owner(
    owner_id: &str,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM transactions WHERE owner_id = $1 ORDER BY datetime(created_at) DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(owner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}

pub async fn fetch_pending_deposits(
    created_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM transactions
            WHERE kind = 'deposit' AND status = 'pending' AND datetime(created_at) < datetime($1)
            ORDER BY datetime(created_at) ASC, id ASC
            LIMIT $2
        "#,
    )
    .bind(created_before)
    .bind(limit)
    .fetch_all(conn)
    .await
}

pub async fn fetch_stale_reservations(
    created_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM transactions
            WHERE kind = 'purchase' AND status = 'pending' AND datetime(created_at) < datetime($1)
            ORDER BY id ASC
        "#,
    )
    .bind(created_before)
    .fetch_all(conn)
    .await
}
