//! Stock counter writes
//!
//! Applies a merged delta map inside the caller's transaction: one atomic
//! increment per stock key, never clamped.

use rust_decimal::Decimal;
use serde::Serialize;
use shared::stock::DeltaMap;
use shared::{CounterTarget, StockKey};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Balance of one counter after a write
#[derive(Debug, Clone, Serialize)]
pub struct CounterWrite {
    pub key: StockKey,
    pub delta: Decimal,
    pub balance: Decimal,
}

/// Apply every entry of `deltas` to its counter.
///
/// A key whose product or variant does not exist fails the whole write; the
/// caller's transaction is expected to roll back.
pub async fn apply_delta_map(
    conn: &mut PgConnection,
    deltas: &DeltaMap,
    target: CounterTarget,
    actor: Option<Uuid>,
) -> AppResult<Vec<CounterWrite>> {
    let mut writes = Vec::with_capacity(deltas.len());

    for (key, delta) in deltas.iter() {
        let balance = match key.variant_id {
            Some(variant_id) => {
                increment_variant(&mut *conn, key.product_id, variant_id, *delta).await?
            }
            None => increment_product(&mut *conn, key.product_id, *delta, target, actor).await?,
        }
        .ok_or_else(|| match key.variant_id {
            Some(variant_id) => AppError::NotFound(format!(
                "Variant {} of product {}",
                variant_id, key.product_id
            )),
            None => AppError::not_found("Product", key.product_id),
        })?;

        if balance < Decimal::ZERO {
            tracing::warn!(%key, %delta, %balance, "Stock counter is negative");
        }

        writes.push(CounterWrite {
            key: *key,
            delta: *delta,
            balance,
        });
    }

    Ok(writes)
}

async fn increment_product(
    conn: &mut PgConnection,
    product_id: i64,
    delta: Decimal,
    target: CounterTarget,
    actor: Option<Uuid>,
) -> AppResult<Option<Decimal>> {
    let sql = match target {
        CounterTarget::Owned => {
            r#"
            UPDATE products
            SET quantity = quantity + $1,
                updated_by = COALESCE($2, updated_by),
                updated_at = NOW()
            WHERE id = $3
            RETURNING quantity
            "#
        }
        CounterTarget::SharedChannel => {
            r#"
            UPDATE products
            SET shared_channel_quantity = shared_channel_quantity + $1,
                updated_by = COALESCE($2, updated_by),
                updated_at = NOW()
            WHERE id = $3
            RETURNING shared_channel_quantity
            "#
        }
    };

    let balance = sqlx::query_scalar::<_, Decimal>(sql)
        .bind(delta)
        .bind(actor)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;

    Ok(balance)
}

async fn increment_variant(
    conn: &mut PgConnection,
    product_id: i64,
    variant_id: i64,
    delta: Decimal,
) -> AppResult<Option<Decimal>> {
    let balance = sqlx::query_scalar::<_, Decimal>(
        r#"
        UPDATE product_variants
        SET stock_quantity = stock_quantity + $1,
            updated_at = NOW()
        WHERE id = $2 AND product_id = $3
        RETURNING stock_quantity
        "#,
    )
    .bind(delta)
    .bind(variant_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;

    Ok(balance)
}
