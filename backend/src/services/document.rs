//! Document service: every create, edit, status change and delete runs in one
//! transaction and executes the plan computed by the shared lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::lifecycle::{
    plan_creation, plan_deletion, plan_edit, plan_status_change, DocumentState, PriceAction,
    StatusChange, StockTransition, TransitionPlan,
};
use shared::pricing::carry_bookkeeping;
use shared::{
    parse_document_date, parse_status, validate_lines, Document, DocumentHeaderInput, DocumentId,
    DocumentKind, DocumentLine, DocumentStatus, LineInput, LotId, LotSnapshot, StockKey,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::capabilities::SchemaCapabilities;
use crate::error::{AppError, AppResult};
use crate::services::lot::record_lot;
use crate::services::pricing::{load_pricing_book, PriceCascade};
use crate::services::stock::apply_delta_map;

/// Header plus lines as submitted for create and update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentInput {
    #[serde(flatten)]
    pub header: DocumentHeaderInput,
    #[serde(default)]
    pub lines: Vec<LineInput>,
}

/// A document as returned to clients, with its computed display number
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub display_number: String,
    #[serde(flatten)]
    pub document: Document,
}

impl From<Document> for DocumentView {
    fn from(document: Document) -> Self {
        Self {
            display_number: document.display_number(),
            document,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedDocument {
    pub id: DocumentId,
    pub display_number: String,
    pub status: DocumentStatus,
    pub stock: StockTransition,
    pub lots: Vec<LotId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChangeOutcome {
    pub noop: bool,
    pub message: String,
    pub stock: StockTransition,
    pub price: PriceAction,
    pub document: DocumentView,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedDocument {
    pub id: DocumentId,
    pub display_number: String,
    pub stock: StockTransition,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: i64,
    kind: String,
    status: String,
    document_date: NaiveDate,
    counterpart_id: Option<i64>,
    total_amount: Decimal,
    excluded_from_aggregation: bool,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self, lines: Vec<DocumentLine>) -> AppResult<Document> {
        let kind = DocumentKind::from_str(&self.kind).ok_or_else(|| {
            AppError::Internal(format!("document {} has unknown kind '{}'", self.id, self.kind))
        })?;
        let status = DocumentStatus::from_label(&self.status).ok_or_else(|| {
            AppError::Internal(format!(
                "document {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;

        Ok(Document {
            id: self.id,
            kind,
            status,
            document_date: self.document_date,
            counterpart_id: self.counterpart_id,
            total_amount: self.total_amount,
            excluded_from_aggregation: self.excluded_from_aggregation,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            lines,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    unit_id: Option<i64>,
    lot_id: Option<i64>,
    quantity: Decimal,
    unit_price: Decimal,
    discount_percentage: Decimal,
    discount_amount: Decimal,
    total: Decimal,
    old_purchase_price: Option<Decimal>,
    price_applied: bool,
}

impl From<LineRow> for DocumentLine {
    fn from(row: LineRow) -> Self {
        DocumentLine {
            id: Some(row.id),
            product_id: row.product_id,
            variant_id: row.variant_id,
            unit_id: row.unit_id,
            lot_id: row.lot_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount_percentage: row.discount_percentage,
            discount_amount: row.discount_amount,
            total: row.total,
            old_purchase_price: row.old_purchase_price,
            price_applied: row.price_applied,
        }
    }
}

const DOCUMENT_COLUMNS: &str = r#"
    id, kind, status, document_date, counterpart_id, total_amount,
    excluded_from_aggregation, created_by, created_at, updated_at
"#;

const LINE_SELECT_TRACKED: &str = r#"
    SELECT id, product_id, variant_id, unit_id, lot_id, quantity, unit_price,
           discount_percentage, discount_amount, total, old_purchase_price, price_applied
    FROM document_lines
    WHERE document_id = $1
    ORDER BY position
"#;

const LINE_SELECT_UNTRACKED: &str = r#"
    SELECT id, product_id, variant_id, unit_id, lot_id, quantity, unit_price,
           discount_percentage, discount_amount, total,
           NULL::NUMERIC AS old_purchase_price, FALSE AS price_applied
    FROM document_lines
    WHERE document_id = $1
    ORDER BY position
"#;

/// Document service for all six document kinds
#[derive(Clone)]
pub struct DocumentService {
    db: PgPool,
    capabilities: Arc<SchemaCapabilities>,
}

impl DocumentService {
    pub fn new(db: PgPool, capabilities: Arc<SchemaCapabilities>) -> Self {
        Self { db, capabilities }
    }

    fn cascade(&self, actor: Option<Uuid>) -> PriceCascade {
        PriceCascade::new(actor, self.capabilities.tracks_line_prices())
    }

    /// Create a document with its lines and apply its initial effects
    pub async fn create(
        &self,
        kind: DocumentKind,
        input: DocumentInput,
        actor: Option<Uuid>,
    ) -> AppResult<CreatedDocument> {
        let mut lines = validate_lines(&input.lines)?;
        let status = match input.header.status.as_deref() {
            Some(label) => parse_status(kind, label)?,
            None => kind.default_status(),
        };
        let document_date =
            parse_document_date(input.header.document_date.as_deref(), Utc::now().date_naive())?;

        let mut tx = self.db.begin().await?;

        ensure_stock_keys_exist(&mut tx, &lines).await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO documents (
                kind, status, document_date, counterpart_id, total_amount,
                excluded_from_aggregation, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(status.label())
        .bind(document_date)
        .bind(input.header.counterpart_id)
        .bind(input.header.total_amount)
        .bind(input.header.excluded_from_aggregation)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        self.insert_lines(&mut tx, id, &mut lines).await?;

        let state = DocumentState {
            kind,
            status,
            excluded_from_aggregation: input.header.excluded_from_aggregation,
            lines: &lines,
        };
        let plan = plan_creation(&state)?;
        self.execute_plan(&mut tx, kind, &plan, &[], &lines, actor)
            .await?;

        let lots = if kind.records_lots() {
            self.record_lots(&mut tx, id, &lines).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;

        tracing::info!(
            document_id = id,
            kind = %kind,
            status = %status,
            stock = ?plan.stock,
            price = ?plan.price,
            lots = lots.len(),
            "Document created"
        );

        Ok(CreatedDocument {
            id,
            display_number: shared::display_number(kind, id),
            status,
            stock: plan.stock,
            lots,
        })
    }

    /// Replace header and lines; the status is kept
    pub async fn update(
        &self,
        kind: DocumentKind,
        id: DocumentId,
        input: DocumentInput,
        actor: Option<Uuid>,
    ) -> AppResult<DocumentView> {
        let mut new_lines = validate_lines(&input.lines)?;
        let mut tx = self.db.begin().await?;

        let before = self.lock_document(&mut tx, kind, id).await?;
        let document_date = parse_document_date(
            input.header.document_date.as_deref(),
            before.document_date,
        )?;

        ensure_stock_keys_exist(&mut tx, &new_lines).await?;

        let before_state = DocumentState {
            kind,
            status: before.status,
            excluded_from_aggregation: before.excluded_from_aggregation,
            lines: &before.lines,
        };
        let after_state = DocumentState {
            kind,
            status: before.status,
            excluded_from_aggregation: input.header.excluded_from_aggregation,
            lines: &new_lines,
        };
        let plan = plan_edit(&before_state, &after_state)?;

        // Old line rows are about to go; revert their cascade while they still exist
        if plan.price == PriceAction::Reapply {
            self.cascade(actor).revert(&mut tx, &before.lines).await?;
        } else {
            carry_bookkeeping(&before.lines, &mut new_lines);
        }

        sqlx::query("DELETE FROM document_lines WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        self.insert_lines(&mut tx, id, &mut new_lines).await?;

        self.apply_stock(&mut tx, kind, &plan, actor).await?;
        if plan.price == PriceAction::Reapply {
            self.cascade(actor).apply(&mut tx, &new_lines).await?;
        }

        sqlx::query(
            r#"
            UPDATE documents
            SET document_date = $1,
                counterpart_id = $2,
                total_amount = $3,
                excluded_from_aggregation = $4,
                updated_by = COALESCE($5, updated_by),
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(document_date)
        .bind(input.header.counterpart_id)
        .bind(input.header.total_amount)
        .bind(input.header.excluded_from_aggregation)
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = self.load_document(&mut tx, kind, id).await?;
        tx.commit().await?;

        tracing::info!(
            document_id = id,
            kind = %kind,
            stock = ?plan.stock,
            price = ?plan.price,
            "Document updated"
        );

        Ok(updated.into())
    }

    /// Move a document to another status, applying or withdrawing its effects
    pub async fn change_status(
        &self,
        kind: DocumentKind,
        id: DocumentId,
        label: &str,
        actor: Option<Uuid>,
    ) -> AppResult<StatusChangeOutcome> {
        let new_status = parse_status(kind, label)?;
        let mut tx = self.db.begin().await?;

        let before = self.lock_document(&mut tx, kind, id).await?;
        let state = DocumentState {
            kind,
            status: before.status,
            excluded_from_aggregation: before.excluded_from_aggregation,
            lines: &before.lines,
        };

        let plan = match plan_status_change(&state, new_status)? {
            StatusChange::NoOp => {
                tx.rollback().await?;
                return Ok(StatusChangeOutcome {
                    noop: true,
                    message: format!("Status is already '{}', nothing changed", new_status),
                    stock: StockTransition::Unchanged,
                    price: PriceAction::None,
                    document: before.into(),
                });
            }
            StatusChange::Transition(plan) => plan,
        };

        self.execute_plan(&mut tx, kind, &plan, &before.lines, &before.lines, actor)
            .await?;

        sqlx::query(
            r#"
            UPDATE documents
            SET status = $1, updated_by = COALESCE($2, updated_by), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(new_status.label())
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = self.load_document(&mut tx, kind, id).await?;
        tx.commit().await?;

        tracing::info!(
            document_id = id,
            kind = %kind,
            from = %before.status,
            to = %new_status,
            stock = ?plan.stock,
            price = ?plan.price,
            "Document status changed"
        );

        Ok(StatusChangeOutcome {
            noop: false,
            message: format!("Status changed from '{}' to '{}'", before.status, new_status),
            stock: plan.stock,
            price: plan.price,
            document: updated.into(),
        })
    }

    /// Withdraw the document's effects, then remove it with its lines.
    /// Lots it recorded stay and lose their purchase order reference.
    pub async fn delete(
        &self,
        kind: DocumentKind,
        id: DocumentId,
        actor: Option<Uuid>,
    ) -> AppResult<DeletedDocument> {
        let mut tx = self.db.begin().await?;

        let before = self.lock_document(&mut tx, kind, id).await?;
        let state = DocumentState {
            kind,
            status: before.status,
            excluded_from_aggregation: before.excluded_from_aggregation,
            lines: &before.lines,
        };
        let plan = plan_deletion(&state)?;

        self.execute_plan(&mut tx, kind, &plan, &before.lines, &[], actor)
            .await?;

        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            document_id = id,
            kind = %kind,
            stock = ?plan.stock,
            price = ?plan.price,
            "Document deleted"
        );

        Ok(DeletedDocument {
            id,
            display_number: shared::display_number(kind, id),
            stock: plan.stock,
        })
    }

    pub async fn get(&self, kind: DocumentKind, id: DocumentId) -> AppResult<DocumentView> {
        let mut conn = self.db.acquire().await?;
        let document = self.load_document(&mut conn, kind, id).await?;
        Ok(document.into())
    }

    /// All documents of one kind, newest first
    pub async fn list(&self, kind: DocumentKind) -> AppResult<Vec<DocumentView>> {
        let mut conn = self.db.acquire().await?;

        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE kind = $1 ORDER BY id DESC"
        ))
        .bind(kind.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.load_lines(&mut conn, row.id).await?;
            documents.push(DocumentView::from(row.into_document(lines)?));
        }
        Ok(documents)
    }

    async fn execute_plan(
        &self,
        conn: &mut PgConnection,
        kind: DocumentKind,
        plan: &TransitionPlan,
        previous_lines: &[DocumentLine],
        current_lines: &[DocumentLine],
        actor: Option<Uuid>,
    ) -> AppResult<()> {
        self.apply_stock(&mut *conn, kind, plan, actor).await?;

        let cascade = self.cascade(actor);
        match plan.price {
            PriceAction::None => {}
            PriceAction::Apply => {
                cascade.apply(&mut *conn, current_lines).await?;
            }
            PriceAction::Revert => {
                cascade.revert(&mut *conn, previous_lines).await?;
            }
            PriceAction::Reapply => {
                cascade.revert(&mut *conn, previous_lines).await?;
                cascade.apply(&mut *conn, current_lines).await?;
            }
        }
        Ok(())
    }

    async fn apply_stock(
        &self,
        conn: &mut PgConnection,
        kind: DocumentKind,
        plan: &TransitionPlan,
        actor: Option<Uuid>,
    ) -> AppResult<()> {
        if plan.delta.is_empty() {
            return Ok(());
        }
        let writes = apply_delta_map(conn, &plan.delta, kind.counter_target(), actor).await?;
        tracing::debug!(%kind, counters = writes.len(), "Stock counters written");
        Ok(())
    }

    async fn record_lots(
        &self,
        conn: &mut PgConnection,
        purchase_order_id: DocumentId,
        lines: &[DocumentLine],
    ) -> AppResult<Vec<LotId>> {
        let Some(ledger) = self.capabilities.lot_ledger() else {
            tracing::debug!(purchase_order_id, "Lot ledger unavailable, no lots recorded");
            return Ok(Vec::new());
        };

        let book = load_pricing_book(&mut *conn, lines).await?;
        let mut lots = Vec::with_capacity(lines.len());

        for line in lines {
            let Some(pricing) = book.get(&line.product_id) else {
                return Err(AppError::not_found("Product", line.product_id));
            };
            let snapshot = LotSnapshot::capture(
                purchase_order_id,
                line.stock_key(),
                line.quantity,
                line.unit_price,
                pricing.margins,
            )?;
            lots.push(record_lot(&mut *conn, ledger, &snapshot).await?);
        }

        Ok(lots)
    }

    async fn insert_lines(
        &self,
        conn: &mut PgConnection,
        document_id: DocumentId,
        lines: &mut [DocumentLine],
    ) -> AppResult<()> {
        let sql = if self.capabilities.tracks_line_prices() {
            r#"
            INSERT INTO document_lines (
                document_id, position, product_id, variant_id, unit_id, lot_id, quantity,
                unit_price, discount_percentage, discount_amount, total,
                old_purchase_price, price_applied
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#
        } else {
            r#"
            INSERT INTO document_lines (
                document_id, position, product_id, variant_id, unit_id, lot_id, quantity,
                unit_price, discount_percentage, discount_amount, total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#
        };

        for (position, line) in lines.iter_mut().enumerate() {
            let mut query = sqlx::query_scalar::<_, i64>(sql)
                .bind(document_id)
                .bind(position as i32)
                .bind(line.product_id)
                .bind(line.variant_id)
                .bind(line.unit_id)
                .bind(line.lot_id)
                .bind(line.quantity)
                .bind(line.unit_price)
                .bind(line.discount_percentage)
                .bind(line.discount_amount)
                .bind(line.total);
            if self.capabilities.tracks_line_prices() {
                query = query.bind(line.old_purchase_price).bind(line.price_applied);
            }
            line.id = Some(query.fetch_one(&mut *conn).await?);
        }

        Ok(())
    }

    async fn load_lines(
        &self,
        conn: &mut PgConnection,
        document_id: DocumentId,
    ) -> AppResult<Vec<DocumentLine>> {
        let sql = if self.capabilities.tracks_line_prices() {
            LINE_SELECT_TRACKED
        } else {
            LINE_SELECT_UNTRACKED
        };

        let rows = sqlx::query_as::<_, LineRow>(sql)
            .bind(document_id)
            .fetch_all(conn)
            .await?;

        Ok(rows.into_iter().map(DocumentLine::from).collect())
    }

    async fn load_document(
        &self,
        conn: &mut PgConnection,
        kind: DocumentKind,
        id: DocumentId,
    ) -> AppResult<Document> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND kind = $2"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Document", shared::display_number(kind, id)))?;

        let lines = self.load_lines(conn, id).await?;
        row.into_document(lines)
    }

    /// Load a document with its lines, holding its row lock until the transaction ends
    async fn lock_document(
        &self,
        conn: &mut PgConnection,
        kind: DocumentKind,
        id: DocumentId,
    ) -> AppResult<Document> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND kind = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Document", shared::display_number(kind, id)))?;

        let lines = self.load_lines(conn, id).await?;
        row.into_document(lines)
    }
}

/// Reject lines whose product, or variant of that product, does not exist
async fn ensure_stock_keys_exist(
    conn: &mut PgConnection,
    lines: &[DocumentLine],
) -> AppResult<()> {
    let keys: BTreeSet<StockKey> = lines.iter().map(DocumentLine::stock_key).collect();
    if keys.is_empty() {
        return Ok(());
    }

    let product_ids: Vec<i64> = keys
        .iter()
        .map(|key| key.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let found: BTreeSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE id = ANY($1)")
            .bind(&product_ids)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    if let Some(missing) = product_ids.iter().find(|id| !found.contains(id)) {
        return Err(AppError::not_found("Product", missing));
    }

    let variant_ids: Vec<i64> = keys.iter().filter_map(|key| key.variant_id).collect();
    if variant_ids.is_empty() {
        return Ok(());
    }

    let owners: BTreeMap<i64, i64> = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, product_id FROM product_variants WHERE id = ANY($1)",
    )
    .bind(&variant_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    for key in &keys {
        if let Some(variant_id) = key.variant_id {
            if owners.get(&variant_id) != Some(&key.product_id) {
                return Err(AppError::NotFound(format!(
                    "Variant {} of product {}",
                    variant_id, key.product_id
                )));
            }
        }
    }

    Ok(())
}
