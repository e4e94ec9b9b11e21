use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, instrument};

use crate::gallery::{User, UserId, UserUpdate};
use crate::gallery_web::auth::AdminUser;
use crate::gallery_web::handlers::{FilterParams, JsonBody, OrNotFound, WebError};
use crate::gallery_web::AppState;

#[instrument(skip_all)]
pub async fn list(_admin: AdminUser, State(state): State<AppState>, Query(params): Query<FilterParams>) -> Result<Json<Vec<User>>, WebError> {
    let users = state.store.users(&params.into()).await?;
    Ok(Json(users))
}

#[instrument(skip_all, fields(%id))]
pub async fn get(_admin: AdminUser, State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<User>, WebError> {
    let user = state.store.user(id).await?.or_not_found()?;
    Ok(Json(user))
}

#[instrument(skip_all)]
pub async fn create(_admin: AdminUser, State(state): State<AppState>, JsonBody(user): JsonBody<UserUpdate>) -> Result<Json<User>, WebError> {
    let user = state.store.create_user(user).await?;
    info!("Created user {} for {:?}", user.id, user.email);

    Ok(Json(user))
}

#[instrument(skip_all, fields(%id))]
pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    JsonBody(user): JsonBody<UserUpdate>,
) -> Result<Json<User>, WebError> {
    let user = state.store.update_user(id, user).await?.or_not_found()?;
    Ok(Json(user))
}

#[instrument(skip_all, fields(%id))]
pub async fn delete(AdminUser(admin): AdminUser, State(state): State<AppState>, Path(id): Path<UserId>) -> Result<impl IntoResponse, WebError> {
    state.store.delete_user(id).await?.or_not_found()?;
    info!("User {} deleted by {}", id, admin.id);

    Ok(StatusCode::OK)
}
