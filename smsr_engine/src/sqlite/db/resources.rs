use sqlx::SqliteConnection;

use crate::{
    db_types::{MicroUsd, NewResource, PurchasedResource, ResourceStatus},
    traits::LedgerError,
};

pub async fn insert_resource(
    owner_id: &str,
    transaction_id: i64,
    cost: MicroUsd,
    resource: NewResource,
    conn: &mut SqliteConnection,
) -> Result<PurchasedResource, LedgerError> {
    let upstream_id = resource.upstream_id.clone();
    let resource = sqlx::query_as(
        r#"
            INSERT INTO purchased_resources
                (owner_id, upstream_id, transaction_id, service, country, resource_value, status, cost, expiry_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8)
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(resource.upstream_id)
    .bind(transaction_id)
    .bind(resource.service)
    .bind(resource.country)
    .bind(resource.resource_value)
    .bind(cost)
    .bind(resource.expiry_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::AlreadyExists(upstream_id),
        _ => LedgerError::from(e),
    })?;
    Ok(resource)
}

pub async fn fetch_resource(id: i64, conn: &mut SqliteConnection) -> Result<Option<PurchasedResource>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM purchased_resources WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_for_owner(
    owner_id: &str,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PurchasedResource>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM purchased_resources WHERE owner_id = $1
            ORDER BY datetime(created_at) DESC, id DESC LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}

pub async fn fetch_resources_to_poll(
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PurchasedResource>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM purchased_resources WHERE status IN ('active', 'unknown')
            ORDER BY datetime(updated_at) ASC, id ASC LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// Last-write-wins status update. Refunded resources are never moved out of `refunded`.
pub async fn update_status(
    id: i64,
    status: ResourceStatus,
    messages: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<PurchasedResource>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE purchased_resources SET
                status = $1,
                messages = COALESCE($2, messages),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status <> 'refunded'
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(messages)
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Returns `None` if the resource does not exist or is already refunded.
pub async fn mark_refunded(id: i64, conn: &mut SqliteConnection) -> Result<Option<PurchasedResource>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE purchased_resources SET status = 'refunded', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status <> 'refunded'
            RETURNING *;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}
