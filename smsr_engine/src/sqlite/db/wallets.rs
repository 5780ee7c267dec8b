use sqlx::SqliteConnection;

use crate::{
    db_types::{MicroUsd, Wallet},
    traits::LedgerError,
};

pub async fn upsert_wallet(
    owner_id: &str,
    email: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let wallet = sqlx::query_as(
        r#"
            INSERT INTO wallets (owner_id, email) VALUES ($1, $2)
            ON CONFLICT (owner_id) DO UPDATE
                SET email = COALESCE(excluded.email, wallets.email),
                    updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(email)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

pub async fn fetch_wallet(owner_id: &str, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE owner_id = $1").bind(owner_id).fetch_optional(conn).await?;
    Ok(wallet)
}

pub async fn fetch_wallets_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Vec<Wallet>, sqlx::Error> {
    let wallets = sqlx::query_as("SELECT * FROM wallets WHERE email = $1 COLLATE NOCASE ORDER BY owner_id")
        .bind(email.trim())
        .fetch_all(conn)
        .await?;
    Ok(wallets)
}

/// Adds `amount` to the wallet balance and returns the new balance.
pub async fn credit_wallet(
    owner_id: &str,
    amount: MicroUsd,
    conn: &mut SqliteConnection,
) -> Result<MicroUsd, LedgerError> {
    let balance: Option<MicroUsd> = sqlx::query_scalar(
        r#"
            UPDATE wallets SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP
            WHERE owner_id = $2
            RETURNING balance;
        "#,
    )
    .bind(amount)
    .bind(owner_id)
    .fetch_optional(conn)
    .await?;
    balance.ok_or_else(|| LedgerError::WalletNotFound(owner_id.to_string()))
}

/// Subtracts `amount` from the wallet balance and returns the new balance.
///
/// The balance check and the write are a single statement, so two concurrent debits can never both pass the check
/// against the same starting balance.
pub async fn debit_wallet(
    owner_id: &str,
    amount: MicroUsd,
    conn: &mut SqliteConnection,
) -> Result<MicroUsd, LedgerError> {
    let balance: Option<MicroUsd> = sqlx::query_scalar(
        r#"
            UPDATE wallets SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP
            WHERE owner_id = $2 AND balance >= $1
            RETURNING balance;
        "#,
    )
    .bind(amount)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?;
    match balance {
        Some(b) => Ok(b),
        None => match fetch_wallet(owner_id, conn).await? {
            Some(w) => Err(LedgerError::InsufficientFunds { balance: w.balance, required: amount }),
            None => Err(LedgerError::WalletNotFound(owner_id.to_string())),
        },
    }
}
