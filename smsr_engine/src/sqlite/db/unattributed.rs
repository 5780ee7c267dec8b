use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUnattributedPayment, UnattributedPayment},
    traits::LedgerError,
};

/// Inserts the payment unless it is already on file, then returns the stored record.
pub async fn idempotent_insert(
    payment: NewUnattributedPayment,
    conn: &mut SqliteConnection,
) -> Result<UnattributedPayment, LedgerError> {
    sqlx::query(
        r#"
            INSERT INTO unattributed_payments
                (source, external_reference, gateway_amount, currency, amount, customer_email, reason, raw)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source, external_reference) DO NOTHING;
        "#,
    )
    .bind(&payment.source)
    .bind(&payment.external_reference)
    .bind(payment.gateway_amount)
    .bind(&payment.currency)
    .bind(payment.amount)
    .bind(&payment.customer_email)
    .bind(&payment.reason)
    .bind(&payment.raw)
    .execute(&mut *conn)
    .await?;
    let record = sqlx::query_as("SELECT * FROM unattributed_payments WHERE source = $1 AND external_reference = $2")
        .bind(&payment.source)
        .bind(&payment.external_reference)
        .fetch_one(conn)
        .await?;
    Ok(record)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<UnattributedPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM unattributed_payments WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_by_reference(
    source: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UnattributedPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM unattributed_payments WHERE source = $1 AND external_reference = $2")
        .bind(source)
        .bind(reference)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_payments(
    include_resolved: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<UnattributedPayment>, sqlx::Error> {
    let sql = if include_resolved {
        "SELECT * FROM unattributed_payments ORDER BY id ASC"
    } else {
        "SELECT * FROM unattributed_payments WHERE resolved_owner_id IS NULL ORDER BY id ASC"
    };
    sqlx::query_as(sql).fetch_all(conn).await
}

/// Returns `None` if the payment does not exist or has already been resolved.
pub async fn mark_resolved(
    id: i64,
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UnattributedPayment>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE unattributed_payments SET resolved_owner_id = $1, resolved_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND resolved_owner_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}
