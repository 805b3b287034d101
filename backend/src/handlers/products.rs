//! HTTP handlers for product administration

use axum::{
    extract::{Path, State},
    Json,
};
use shared::ProductId;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::models::{NewProduct, NewVariant, Product, ProductPatch, ProductVariant};
use crate::services::product::ProductDetail;
use crate::services::ProductService;
use crate::AppState;

pub async fn create_product(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(input): Json<NewProduct>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.create_product(input, actor).await?;
    Ok(Json(product))
}

/// Get a product with its variants
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> AppResult<Json<ProductDetail>> {
    let service = ProductService::new(state.db);
    let product = service.get_product(id).await?;
    Ok(Json(product))
}

/// Patch designation, purchase price or margins
pub async fn update_pricing(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.update_pricing(id, patch, actor).await?;
    Ok(Json(product))
}

pub async fn create_variant(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(input): Json<NewVariant>,
) -> AppResult<Json<ProductVariant>> {
    let service = ProductService::new(state.db);
    let variant = service.create_variant(id, input).await?;
    Ok(Json(variant))
}
