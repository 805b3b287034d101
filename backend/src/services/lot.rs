//! Lot ledger service: purchase lots recorded per purchase-order line and read
//! oldest first.
//!
//! Lots are advisory. Their remaining quantities are never reconciled against
//! the product and variant counters, and sales do not consume them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::fifo::{self, FifoCost};
use shared::{
    DerivedPrices, Lot, LotColumn, LotId, LotPatch, LotSnapshot, MarginPercentages, PatchValue,
    StockKey,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::capabilities::HasLotLedger;
use crate::error::{AppError, AppResult};

const LOT_COLUMNS: &str = r#"
    id, product_id, variant_id, remaining_quantity, purchase_price,
    cost_percentage, cost_price, wholesale_percentage, wholesale_price,
    retail_percentage, retail_price, purchase_order_id, created_at
"#;

#[derive(Debug, FromRow)]
struct LotRow {
    id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    remaining_quantity: Decimal,
    purchase_price: Decimal,
    cost_percentage: Decimal,
    cost_price: Decimal,
    wholesale_percentage: Decimal,
    wholesale_price: Decimal,
    retail_percentage: Decimal,
    retail_price: Decimal,
    purchase_order_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Lot {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            remaining_quantity: row.remaining_quantity,
            purchase_price: row.purchase_price,
            margins: MarginPercentages {
                cost: row.cost_percentage,
                wholesale: row.wholesale_percentage,
                retail: row.retail_percentage,
            },
            prices: DerivedPrices {
                cost_price: row.cost_price,
                wholesale_price: row.wholesale_price,
                retail_price: row.retail_price,
            },
            purchase_order_id: row.purchase_order_id,
            created_at: row.created_at,
        }
    }
}

/// Insert one lot inside the purchase order's transaction
pub async fn record_lot(
    conn: &mut PgConnection,
    _ledger: HasLotLedger,
    snapshot: &LotSnapshot,
) -> AppResult<LotId> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO stock_lots (
            product_id, variant_id, remaining_quantity, purchase_price,
            cost_percentage, cost_price, wholesale_percentage, wholesale_price,
            retail_percentage, retail_price, purchase_order_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(snapshot.product_id)
    .bind(snapshot.variant_id)
    .bind(snapshot.quantity)
    .bind(snapshot.purchase_price)
    .bind(snapshot.margins.cost)
    .bind(snapshot.prices.cost_price)
    .bind(snapshot.margins.wholesale)
    .bind(snapshot.prices.wholesale_price)
    .bind(snapshot.margins.retail)
    .bind(snapshot.prices.retail_price)
    .bind(snapshot.purchase_order_id)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Read side and administrative edits of the lot ledger
#[derive(Clone)]
pub struct LotService {
    db: PgPool,
}

impl LotService {
    pub fn new(db: PgPool, _ledger: HasLotLedger) -> Self {
        Self { db }
    }

    /// Lots for one stock key, oldest first, ties broken by id
    pub async fn list_lots(&self, key: StockKey) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(key.product_id)
        .bind(key.variant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Lot::from).collect())
    }

    /// Lot-granular view of stock, independent of the live counter
    pub async fn sum_remaining(&self, key: StockKey) -> AppResult<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(remaining_quantity), 0)
            FROM stock_lots
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(key.product_id)
        .bind(key.variant_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total)
    }

    /// Read-only FIFO cost estimate; lots are left untouched
    pub async fn fifo_cost(&self, key: StockKey, quantity: Decimal) -> AppResult<FifoCost> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }
        let lots = self.list_lots(key).await?;
        Ok(fifo::fifo_cost(&lots, quantity))
    }

    pub async fn get_lot(&self, id: LotId) -> AppResult<Lot> {
        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {LOT_COLUMNS} FROM stock_lots WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Lot", id))?;

        Ok(row.into())
    }

    /// Administrative correction. Touches only the lot row.
    pub async fn adjust_lot(
        &self,
        id: LotId,
        patch: LotPatch,
        actor: Option<Uuid>,
    ) -> AppResult<Lot> {
        if patch.is_empty() {
            return Err(AppError::ValidationError(
                "lot correction has no fields".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let current: Lot = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {LOT_COLUMNS} FROM stock_lots WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Lot", id))?
        .into();

        let writes = patch.resolve(&current)?;

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE stock_lots SET ");
        let mut assignments = builder.separated(", ");
        for (column, value) in writes {
            push_assignment(&mut assignments, column, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(LOT_COLUMNS);

        let updated: Lot = builder
            .build_query_as::<LotRow>()
            .fetch_one(&mut *tx)
            .await?
            .into();

        tx.commit().await?;

        tracing::info!(
            lot_id = id,
            actor = ?actor,
            remaining_quantity = %updated.remaining_quantity,
            purchase_price = %updated.purchase_price,
            "Lot adjusted"
        );

        Ok(updated)
    }
}

fn push_assignment(
    assignments: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    column: LotColumn,
    value: PatchValue,
) {
    assignments.push(column.column_name());
    assignments.push_unseparated(" = ");
    match value {
        PatchValue::Amount(amount) => assignments.push_bind_unseparated(amount),
        PatchValue::Text(text) => assignments.push_bind_unseparated(text),
    };
}
