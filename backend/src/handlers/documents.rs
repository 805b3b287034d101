//! HTTP handlers for document endpoints
//!
//! Every route is scoped by document kind (`purchase_order`, `sale_slip_a`, ...).

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::{parse_kind, DocumentId};

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::document::{
    CreatedDocument, DeletedDocument, DocumentInput, DocumentView, StatusChangeOutcome,
};
use crate::services::DocumentService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusChangeInput {
    pub status: String,
}

fn service(state: &AppState) -> DocumentService {
    DocumentService::new(state.db.clone(), state.capabilities.clone())
}

/// Create a document with its lines
pub async fn create_document(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(kind): Path<String>,
    Json(input): Json<DocumentInput>,
) -> AppResult<Json<CreatedDocument>> {
    let kind = parse_kind(&kind)?;
    let created = service(&state).create(kind, input, actor).await?;
    Ok(Json(created))
}

/// List documents of one kind
pub async fn list_documents(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<DocumentView>>> {
    let kind = parse_kind(&kind)?;
    let documents = service(&state).list(kind).await?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, DocumentId)>,
) -> AppResult<Json<DocumentView>> {
    let kind = parse_kind(&kind)?;
    let document = service(&state).get(kind, id).await?;
    Ok(Json(document))
}

/// Replace a document's header and lines
pub async fn update_document(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((kind, id)): Path<(String, DocumentId)>,
    Json(input): Json<DocumentInput>,
) -> AppResult<Json<DocumentView>> {
    let kind = parse_kind(&kind)?;
    let document = service(&state).update(kind, id, input, actor).await?;
    Ok(Json(document))
}

/// Change a document's status; an unchanged status answers with `noop: true`
pub async fn change_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((kind, id)): Path<(String, DocumentId)>,
    Json(input): Json<StatusChangeInput>,
) -> AppResult<Json<StatusChangeOutcome>> {
    let kind = parse_kind(&kind)?;
    let outcome = service(&state)
        .change_status(kind, id, &input.status, actor)
        .await?;
    Ok(Json(outcome))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((kind, id)): Path<(String, DocumentId)>,
) -> AppResult<Json<DeletedDocument>> {
    let kind = parse_kind(&kind)?;
    let deleted = service(&state).delete(kind, id, actor).await?;
    Ok(Json(deleted))
}
