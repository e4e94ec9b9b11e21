use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::gallery::{Album, AlbumUpdate};
use crate::gallery_web::auth::AdminUser;
use crate::gallery_web::handlers::{JsonBody, OrNotFound, WebError};
use crate::gallery_web::AppState;

/// Body of a create request for albums and tags.
#[derive(Deserialize)]
pub struct NewCollection {
    pub name: String,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Album>>, WebError> {
    Ok(Json(state.store.albums().await?))
}

pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Album>, WebError> {
    let album = state.store.album(&name).await?.or_not_found()?;
    Ok(Json(album))
}

#[instrument(skip_all, fields(name = %new.name))]
pub async fn create(_admin: AdminUser, State(state): State<AppState>, JsonBody(new): JsonBody<NewCollection>) -> Result<Json<Album>, WebError> {
    if new.name.trim().is_empty() {
        return Err(WebError::BadRequest("album name must not be empty".into()));
    }

    let album = state.store.create_album(&new.name).await?;
    info!("Album {:?} created", album.name);

    Ok(Json(album))
}

#[instrument(skip_all, fields(%name))]
pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(name): Path<String>,
    JsonBody(update): JsonBody<AlbumUpdate>,
) -> Result<Json<Album>, WebError> {
    let album = state.store.update_album(&name, update).await?.or_not_found()?;
    Ok(Json(album))
}
