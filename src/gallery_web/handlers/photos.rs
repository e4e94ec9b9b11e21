use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, instrument, warn};

use crate::gallery::{ImageKind, NewPhoto, Photo, PhotoData, PhotoId, PhotoUpdate};
use crate::gallery_web::auth::AdminUser;
use crate::gallery_web::handlers::{FilterParams, JsonBody, OrNotFound, WebError};
use crate::gallery_web::AppState;

#[instrument(skip_all)]
pub async fn list(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Result<Json<Vec<Photo>>, WebError> {
    let photos = state.store.photos(&params.into()).await?;
    Ok(Json(photos))
}

#[instrument(skip_all, fields(%id))]
pub async fn get(State(state): State<AppState>, Path(id): Path<PhotoId>) -> Result<Json<Photo>, WebError> {
    let photo = state.store.photo(id).await?.or_not_found()?;
    Ok(Json(photo))
}

pub async fn image(State(state): State<AppState>, Path(id): Path<PhotoId>) -> Result<Response, WebError> {
    image_response(&state, id, ImageKind::Image).await
}

pub async fn thumbnail(State(state): State<AppState>, Path(id): Path<PhotoId>) -> Result<Response, WebError> {
    image_response(&state, id, ImageKind::Thumbnail).await
}

pub async fn big_thumbnail(State(state): State<AppState>, Path(id): Path<PhotoId>) -> Result<Response, WebError> {
    image_response(&state, id, ImageKind::BigThumbnail).await
}

#[instrument(skip(state))]
async fn image_response(state: &AppState, id: PhotoId, kind: ImageKind) -> Result<Response, WebError> {
    let (mimetype, bytes) = state.store.photo_image(id, kind).await?.or_not_found()?;

    // thumbnails are always rendered as jpeg, whatever was uploaded
    let content_type = match kind {
        ImageKind::Image => mimetype,
        ImageKind::Thumbnail | ImageKind::BigThumbnail => mime::IMAGE_JPEG.to_string(),
    };

    let resp = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(bytes.into())?;

    Ok(resp)
}

/// Accepts a multipart form with the image in `file`, a json array of album
/// names in `albums` and an optional `caption`.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn upload(AdminUser(user): AdminUser, State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Photo>, WebError> {
    let mut file = None;
    let mut albums = Vec::new();
    let mut caption = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| WebError::BadRequest(err.body_text()))? {
        let name = field.name().map(str::to_owned);

        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_owned();

                let claimed = match field.content_type() {
                    Some(mimetype) if mimetype != mime::APPLICATION_OCTET_STREAM.as_ref() => mimetype.to_owned(),
                    _ => mime_guess::from_path(&filename).first_or_octet_stream().to_string(),
                };

                let bytes = field.bytes().await.map_err(|err| WebError::BadRequest(err.body_text()))?;
                file = Some((filename, claimed, bytes.to_vec()));
            }

            Some("albums") => {
                let text = field.text().await.map_err(|err| WebError::BadRequest(err.body_text()))?;

                albums = serde_json::from_str(&text)
                    .map_err(|err| WebError::BadRequest(format!("albums must be a json array of names: {}", err)))?;
            }

            Some("caption") => {
                caption = field.text().await.map_err(|err| WebError::BadRequest(err.body_text()))?;
            }

            name => warn!("Ignoring unexpected form field {:?}", name),
        }
    }

    let Some((filename, claimed, bytes)) = file else {
        return Err(WebError::BadRequest("file is missing".into()));
    };

    let image = Arc::new(bytes);

    let thumbnails = state.scaler.render(image.clone()).await.map_err(|err| {
        warn!("Can not render thumbnails of {:?}: {:#}", filename, err);
        WebError::BadRequest("not a supported image".into())
    })?;

    // the client only gets a say if the format has no registered type
    let mimetype = match thumbnails.mimetype {
        detected if detected != mime::APPLICATION_OCTET_STREAM.as_ref() => detected.to_owned(),
        _ => claimed,
    };

    let new = NewPhoto {
        filename,
        mimetype,
        author_id: user.id,
        caption,
        albums,
    };

    let data = PhotoData {
        image: Arc::unwrap_or_clone(image),
        thumbnail: thumbnails.thumbnail,
        big_thumbnail: thumbnails.big_thumbnail,
    };

    let photo = state.store.create_photo(new, data).await?;
    info!("Photo {} uploaded as {:?}", photo.id, photo.filename);

    Ok(Json(photo))
}

#[instrument(skip_all, fields(%id))]
pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<PhotoId>,
    JsonBody(update): JsonBody<PhotoUpdate>,
) -> Result<Json<Photo>, WebError> {
    let photo = state.store.update_photo(id, update).await?.or_not_found()?;
    Ok(Json(photo))
}

#[instrument(skip_all, fields(%id))]
pub async fn delete(_admin: AdminUser, State(state): State<AppState>, Path(id): Path<PhotoId>) -> Result<impl IntoResponse, WebError> {
    state.store.delete_photo(id).await?.or_not_found()?;
    info!("Photo {} deleted", id);

    Ok(StatusCode::OK)
}
