use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::gallery_web::auth::{self, AUTH_COOKIE, OAUTH_STATE_COOKIE};
use crate::gallery_web::handlers::WebError;
use crate::gallery_web::AppState;

const OAUTH_COOKIE_PATH: &str = "/api/auth";

/// Sends the browser to the identity provider.
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Redirect), WebError> {
    let csrf = hex::encode(rand::random::<[u8; 16]>());
    let url = state.identity.authorize_url(&csrf)?;

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path(OAUTH_COOKIE_PATH)
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax);

    Ok((jar.add(cookie), Redirect::to(&url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

/// The identity provider redirects back here after the user agreed to log in.
#[instrument(skip_all)]
pub async fn callback(State(state): State<AppState>, jar: CookieJar, Query(params): Query<CallbackParams>) -> Result<(CookieJar, Redirect), WebError> {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|cookie| cookie.value());
    if expected.is_none() || expected != params.state.as_deref() {
        return Err(WebError::BadRequest("oauth state does not match".into()));
    }

    let Some(code) = params.code else {
        return Err(WebError::BadRequest("code is missing".into()));
    };

    let token = state.identity.exchange(&code).await.map_err(|err| {
        warn!("Code exchange failed: {:#}", err);
        WebError::BadRequest("code exchange failed".into())
    })?;

    let identity = state.identity.identity(&token).await?;

    let Some(user) = state.store.login(&identity.email, &identity.name, &token).await? else {
        warn!("Login attempt of unknown user {:?}", identity.email);
        return Err(WebError::Forbidden);
    };

    info!("User {} logged in as {:?}", user.id, user.email);

    let mut state_cookie = Cookie::build((OAUTH_STATE_COOKIE, "")).path(OAUTH_COOKIE_PATH).build();
    state_cookie.make_removal();

    let jar = auth::start_session(jar.add(state_cookie), &user, &token, state.secure_cookies);

    Ok((jar, Redirect::to("/")))
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Redirect), WebError> {
    if let Some(cookie) = jar.get(AUTH_COOKIE) {
        state.store.logout(cookie.value()).await?;
    }

    Ok((auth::clear_session(jar), Redirect::to("/")))
}
