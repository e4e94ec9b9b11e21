use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;

use crate::gallery::{AlbumUpdate, Tag};
use crate::gallery_web::auth::AdminUser;
use crate::gallery_web::handlers::albums::NewCollection;
use crate::gallery_web::handlers::{JsonBody, OrNotFound, WebError};
use crate::gallery_web::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, WebError> {
    Ok(Json(state.store.tags().await?))
}

pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Tag>, WebError> {
    let tag = state.store.tag(&name).await?.or_not_found()?;
    Ok(Json(tag))
}

#[instrument(skip_all, fields(name = %new.name))]
pub async fn create(_admin: AdminUser, State(state): State<AppState>, JsonBody(new): JsonBody<NewCollection>) -> Result<Json<Tag>, WebError> {
    if new.name.trim().is_empty() {
        return Err(WebError::BadRequest("tag name must not be empty".into()));
    }

    Ok(Json(state.store.create_tag(&new.name).await?))
}

#[instrument(skip_all, fields(%name))]
pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
    JsonBody(update): JsonBody<AlbumUpdate>,
) -> Result<Json<Tag>, WebError> {
    let tag = state.store.update_tag(&name, update).await?.or_not_found()?;
    Ok(Json(tag))
}
