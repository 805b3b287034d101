//! Route definitions for the stock ledger API

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/documents", document_routes())
        .nest("/products", product_routes())
        .nest("/lots", lot_routes())
}

/// Document routes, scoped by kind
fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:kind",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route(
            "/:kind/:id",
            get(handlers::get_document)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/:kind/:id/status", post(handlers::change_status))
}

/// Product administration and per-product lot views
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_product))
        .route("/:id", get(handlers::get_product))
        .route("/:id/pricing", patch(handlers::update_pricing))
        .route("/:id/variants", post(handlers::create_variant))
        .route("/:id/lots", get(handlers::list_lots))
        .route("/:id/lots/summary", get(handlers::lot_summary))
        .route("/:id/fifo-cost", get(handlers::fifo_cost))
}

/// Lot routes
fn lot_routes() -> Router<AppState> {
    Router::new().route("/:id", get(handlers::get_lot).patch(handlers::adjust_lot))
}
