//! Lot ledger HTTP handlers
//!
//! All routes answer 501 when the deployment has no lot store.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::fifo::FifoCost;
use shared::{LotId, ProductId, StockKey, VariantId};

use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::models::{Lot, LotPatch};
use crate::services::LotService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LotKeyQuery {
    pub variant_id: Option<VariantId>,
}

#[derive(Debug, Deserialize)]
pub struct FifoCostQuery {
    pub variant_id: Option<VariantId>,
    pub quantity: Decimal,
}

#[derive(Debug, Serialize)]
pub struct LotSummary {
    pub key: StockKey,
    pub remaining_quantity: Decimal,
}

fn service(state: &AppState) -> AppResult<LotService> {
    state
        .capabilities
        .lot_ledger()
        .map(|ledger| LotService::new(state.db.clone(), ledger))
        .ok_or(AppError::LotLedgerUnavailable)
}

/// Lots of a product or variant, oldest first
pub async fn list_lots(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(query): Query<LotKeyQuery>,
) -> AppResult<Json<Vec<Lot>>> {
    let key = StockKey::new(product_id, query.variant_id);
    let lots = service(&state)?.list_lots(key).await?;
    Ok(Json(lots))
}

pub async fn lot_summary(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(query): Query<LotKeyQuery>,
) -> AppResult<Json<LotSummary>> {
    let key = StockKey::new(product_id, query.variant_id);
    let remaining_quantity = service(&state)?.sum_remaining(key).await?;
    Ok(Json(LotSummary {
        key,
        remaining_quantity,
    }))
}

/// Estimated cost of goods if `quantity` were drawn oldest lot first
pub async fn fifo_cost(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(query): Query<FifoCostQuery>,
) -> AppResult<Json<FifoCost>> {
    let key = StockKey::new(product_id, query.variant_id);
    let cost = service(&state)?.fifo_cost(key, query.quantity).await?;
    Ok(Json(cost))
}

pub async fn get_lot(
    State(state): State<AppState>,
    Path(id): Path<LotId>,
) -> AppResult<Json<Lot>> {
    let lot = service(&state)?.get_lot(id).await?;
    Ok(Json(lot))
}

/// Administrative correction of quantity or prices
pub async fn adjust_lot(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<LotId>,
    Json(patch): Json<LotPatch>,
) -> AppResult<Json<Lot>> {
    let lot = service(&state)?.adjust_lot(id, patch, actor).await?;
    Ok(Json(lot))
}
