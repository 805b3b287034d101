//! Product administration: creation, typed pricing edits and variants

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    DerivedPrices, MarginPercentages, NewProduct, NewVariant, PatchValue, Product, ProductColumn,
    ProductId, ProductPatch, ProductVariant,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const PRODUCT_COLUMNS: &str = r#"
    id, designation, purchase_price,
    cost_percentage, cost_price, wholesale_percentage, wholesale_price,
    retail_percentage, retail_price, quantity, shared_channel_quantity,
    updated_by, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    designation: String,
    purchase_price: Decimal,
    cost_percentage: Decimal,
    cost_price: Decimal,
    wholesale_percentage: Decimal,
    wholesale_price: Decimal,
    retail_percentage: Decimal,
    retail_price: Decimal,
    quantity: Decimal,
    shared_channel_quantity: Decimal,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            designation: row.designation,
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
            quantity: row.quantity,
            shared_channel_quantity: row.shared_channel_quantity,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: i64,
    product_id: i64,
    name: String,
    stock_quantity: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        ProductVariant {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            stock_quantity: row.stock_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Product with its variants
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product; absolute prices are always projected from the margins
    pub async fn create_product(
        &self,
        input: NewProduct,
        actor: Option<Uuid>,
    ) -> AppResult<Product> {
        let designation = input.designation.trim();
        if designation.is_empty() {
            return Err(AppError::ValidationError(
                "designation is required".to_string(),
            ));
        }
        if input.shared_channel_quantity > input.quantity {
            return Err(AppError::ValidationError(
                "shared_channel_quantity cannot exceed quantity".to_string(),
            ));
        }

        let prices = DerivedPrices::project(input.purchase_price, &input.margins)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (
                designation, purchase_price,
                cost_percentage, cost_price, wholesale_percentage, wholesale_price,
                retail_percentage, retail_price, quantity, shared_channel_quantity, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(designation)
        .bind(input.purchase_price)
        .bind(input.margins.cost)
        .bind(prices.cost_price)
        .bind(input.margins.wholesale)
        .bind(prices.wholesale_price)
        .bind(input.margins.retail)
        .bind(prices.retail_price)
        .bind(input.quantity)
        .bind(input.shared_channel_quantity)
        .bind(actor)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product_id = row.id, "Product created");
        Ok(row.into())
    }

    pub async fn get_product(&self, id: ProductId) -> AppResult<ProductDetail> {
        let product: Product = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Product", id))?
        .into();

        let variants = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, product_id, name, stock_quantity, created_at, updated_at
            FROM product_variants
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(ProductDetail {
            product,
            variants: variants.into_iter().map(ProductVariant::from).collect(),
        })
    }

    /// Apply a pricing patch; derived prices are rewritten in the same statement
    pub async fn update_pricing(
        &self,
        id: ProductId,
        patch: ProductPatch,
        actor: Option<Uuid>,
    ) -> AppResult<Product> {
        if patch.is_empty() {
            return Err(AppError::ValidationError(
                "product patch has no fields".to_string(),
            ));
        }
        if matches!(&patch.designation, Some(d) if d.trim().is_empty()) {
            return Err(AppError::ValidationError(
                "designation cannot be blank".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let current: Product = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Product", id))?
        .into();

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE products SET ");
        let mut assignments = builder.separated(", ");
        for (column, value) in patch.resolve(&current)? {
            push_assignment(&mut assignments, column, value);
        }
        assignments.push("updated_by = COALESCE(");
        assignments.push_bind_unseparated(actor);
        assignments.push_unseparated(", updated_by)");
        assignments.push("updated_at = NOW()");
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(PRODUCT_COLUMNS);

        let updated: Product = builder
            .build_query_as::<ProductRow>()
            .fetch_one(&mut *tx)
            .await?
            .into();

        tx.commit().await?;

        tracing::info!(
            product_id = id,
            purchase_price = %updated.purchase_price,
            "Product pricing updated"
        );
        Ok(updated)
    }

    pub async fn create_variant(
        &self,
        product_id: ProductId,
        input: NewVariant,
    ) -> AppResult<ProductVariant> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("name is required".to_string()));
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::not_found("Product", product_id));
        }

        let row = sqlx::query_as::<_, VariantRow>(
            r#"
            INSERT INTO product_variants (product_id, name, stock_quantity)
            VALUES ($1, $2, $3)
            RETURNING id, product_id, name, stock_quantity, created_at, updated_at
            "#,
        )
        .bind(product_id)
        .bind(name)
        .bind(input.stock_quantity)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }
}

fn push_assignment(
    assignments: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    column: ProductColumn,
    value: PatchValue,
) {
    assignments.push(column.column_name());
    assignments.push_unseparated(" = ");
    match value {
        PatchValue::Amount(amount) => assignments.push_bind_unseparated(amount),
        PatchValue::Text(text) => assignments.push_bind_unseparated(text),
    };
}
