//! Purchase price cascade execution

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use shared::pricing::{plan_apply, plan_revert, CascadeStep, PricingBook, ProductPricing};
use shared::{DerivedPrices, DocumentLine, MarginPercentages, ProductId};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, FromRow)]
struct PricingRow {
    id: i64,
    purchase_price: Decimal,
    cost_percentage: Decimal,
    wholesale_percentage: Decimal,
    retail_percentage: Decimal,
}

/// Load the pricing of every product referenced by `lines`
pub async fn load_pricing_book(
    conn: &mut PgConnection,
    lines: &[DocumentLine],
) -> AppResult<PricingBook> {
    let ids: Vec<ProductId> = lines
        .iter()
        .map(|line| line.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if ids.is_empty() {
        return Ok(PricingBook::new());
    }

    let rows = sqlx::query_as::<_, PricingRow>(
        r#"
        SELECT id, purchase_price, cost_percentage, wholesale_percentage, retail_percentage
        FROM products
        WHERE id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    let book: PricingBook = rows
        .into_iter()
        .map(|row| {
            (
                row.id,
                ProductPricing {
                    purchase_price: row.purchase_price,
                    margins: MarginPercentages {
                        cost: row.cost_percentage,
                        wholesale: row.wholesale_percentage,
                        retail: row.retail_percentage,
                    },
                },
            )
        })
        .collect();

    if let Some(missing) = ids.iter().find(|id| !book.contains_key(id)) {
        return Err(AppError::not_found("Product", missing));
    }

    Ok(book)
}

/// Runs the cascade for one purchase order inside the caller's transaction
pub struct PriceCascade {
    actor: Option<Uuid>,
    track_line_prices: bool,
}

impl PriceCascade {
    pub fn new(actor: Option<Uuid>, track_line_prices: bool) -> Self {
        Self {
            actor,
            track_line_prices,
        }
    }

    /// Push line prices onto their products
    pub async fn apply(
        &self,
        conn: &mut PgConnection,
        lines: &[DocumentLine],
    ) -> AppResult<Vec<CascadeStep>> {
        let book = load_pricing_book(&mut *conn, lines).await?;
        let steps = plan_apply(lines, &book)?;
        self.execute(conn, lines, &steps).await?;
        Ok(steps)
    }

    /// Restore remembered prices where the guard allows it
    pub async fn revert(
        &self,
        conn: &mut PgConnection,
        lines: &[DocumentLine],
    ) -> AppResult<Vec<CascadeStep>> {
        let book = load_pricing_book(&mut *conn, lines).await?;
        let steps = plan_revert(lines, &book)?;
        self.execute(conn, lines, &steps).await?;
        Ok(steps)
    }

    async fn execute(
        &self,
        conn: &mut PgConnection,
        lines: &[DocumentLine],
        steps: &[CascadeStep],
    ) -> AppResult<()> {
        for step in steps {
            match step {
                CascadeStep::Apply {
                    product_id,
                    new_price,
                    prices,
                    ..
                } => {
                    self.write_product_price(&mut *conn, *product_id, *new_price, prices)
                        .await?;
                }
                CascadeStep::Restore {
                    product_id,
                    restored_price,
                    prices,
                    ..
                } => {
                    self.write_product_price(&mut *conn, *product_id, *restored_price, prices)
                        .await?;
                }
                CascadeStep::Skip {
                    product_id,
                    current_price,
                    expected_price,
                    ..
                } => {
                    tracing::info!(
                        product_id,
                        %current_price,
                        %expected_price,
                        "Price changed since validation, leaving it in place"
                    );
                }
            }

            let line_id = lines.get(step.line()).and_then(|line| line.id);
            if let (true, Some(line_id)) = (self.track_line_prices, line_id) {
                self.write_line_bookkeeping(&mut *conn, line_id, step).await?;
            }
        }

        Ok(())
    }

    async fn write_product_price(
        &self,
        conn: &mut PgConnection,
        product_id: ProductId,
        purchase_price: Decimal,
        prices: &DerivedPrices,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET purchase_price = $1,
                cost_price = $2,
                wholesale_price = $3,
                retail_price = $4,
                updated_by = COALESCE($5, updated_by),
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(purchase_price)
        .bind(prices.cost_price)
        .bind(prices.wholesale_price)
        .bind(prices.retail_price)
        .bind(self.actor)
        .bind(product_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Product", product_id));
        }
        Ok(())
    }

    async fn write_line_bookkeeping(
        &self,
        conn: &mut PgConnection,
        line_id: i64,
        step: &CascadeStep,
    ) -> AppResult<()> {
        match step {
            CascadeStep::Apply { old_price, .. } => {
                sqlx::query(
                    "UPDATE document_lines SET old_purchase_price = $1, price_applied = TRUE WHERE id = $2",
                )
                .bind(*old_price)
                .bind(line_id)
                .execute(conn)
                .await?;
            }
            CascadeStep::Restore { .. } | CascadeStep::Skip { .. } => {
                sqlx::query("UPDATE document_lines SET price_applied = FALSE WHERE id = $1")
                    .bind(line_id)
                    .execute(conn)
                    .await?;
            }
        }
        Ok(())
    }
}
