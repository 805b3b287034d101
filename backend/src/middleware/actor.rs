//! Actor extraction
//!
//! Callers are authenticated upstream; the acting user arrives as a header and
//! is only recorded on the rows it touches.

use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// The user on whose behalf the request runs, if the caller named one
#[derive(Debug, Clone, Copy, Default)]
pub struct Actor(pub Option<Uuid>);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Actor(None));
        };

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(|id| Actor(Some(id)))
            .ok_or_else(|| AppError::ValidationError(format!("{} must be a UUID", ACTOR_HEADER)))
    }
}
