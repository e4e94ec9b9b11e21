use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::error;

use crate::gallery::filter::ItemFilter;
use crate::gallery_web::auth;

pub mod albums;
pub mod login;
pub mod photos;
pub mod tags;
pub mod users;

pub enum WebError {
    BadRequest(String),

    /// No valid session. `expired` is set if the client presented a token
    /// that is no longer known, its session cookies are then cleared.
    Unauthorized { expired: bool },

    Forbidden,
    NotFound,
    Internal(anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),

            WebError::Unauthorized { expired: true } => {
                let jar = auth::clear_session(CookieJar::new());
                (StatusCode::UNAUTHORIZED, jar, "session expired").into_response()
            }

            WebError::Unauthorized { expired: false } => (StatusCode::UNAUTHORIZED, "not logged in").into_response(),
            WebError::Forbidden => (StatusCode::FORBIDDEN, "forbidden").into_response(),
            WebError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),

            WebError::Internal(err) => {
                error!("Request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for WebError {
    fn from(err: T) -> Self {
        WebError::Internal(err.into())
    }
}

/// Maps the not-found case of a store lookup to a 404.
pub trait OrNotFound<T> {
    fn or_not_found(self) -> Result<T, WebError>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self) -> Result<T, WebError> {
        self.ok_or(WebError::NotFound)
    }
}

/// Like [Json], but every malformed body is answered with a 400.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(WebError::BadRequest(rejection.body_text())),
        }
    }
}

/// Query parameters of the listing endpoints. Numbers that do not parse
/// are treated as zero.
#[derive(Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    query: String,
    count: Option<String>,
    skip: Option<String>,
    album: Option<String>,
}

impl From<FilterParams> for ItemFilter {
    fn from(params: FilterParams) -> Self {
        let number = |value: Option<String>| -> u32 { value.and_then(|value| value.trim().parse().ok()).unwrap_or(0) };

        ItemFilter {
            query: params.query,
            count: number(params.count),
            skip: number(params.skip),
            album: params.album,
        }
    }
}
