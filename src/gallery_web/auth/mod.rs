use anyhow::Result;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};

use crate::gallery::store::Store;
use crate::gallery::User;
use crate::gallery_web::handlers::WebError;
use crate::gallery_web::AppState;

mod google;

pub use google::GoogleProvider;

/// Carries the session token. Only readable by the server.
pub const AUTH_COOKIE: &str = "authentication";

// informational cookies for the frontend
pub const ROLE_COOKIE: &str = "role";
pub const USERNAME_COOKIE: &str = "username";
pub const USER_ID_COOKIE: &str = "user_id";

/// Holds the oauth state parameter between the redirect and the callback.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const SESSION_COOKIES: [&str; 4] = [AUTH_COOKIE, ROLE_COOKIE, USERNAME_COOKIE, USER_ID_COOKIE];

/// Who a user is according to the identity provider.
#[derive(Clone, Debug)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The url to send the browser to. The provider passes `state` back to the callback.
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Exchanges the code of the callback for an access token.
    async fn exchange(&self, code: &str) -> Result<String>;

    /// Fetches the identity of the owner of an access token.
    async fn identity(&self, token: &str) -> Result<Identity>;
}

pub enum Session {
    Anonymous,

    /// A token was presented, but no user has it.
    Expired,

    Authenticated(User),
}

pub async fn check_session(store: &Store, jar: &CookieJar) -> Result<Session> {
    let Some(cookie) = jar.get(AUTH_COOKIE) else {
        return Ok(Session::Anonymous);
    };

    let session = match store.user_by_token(cookie.value()).await? {
        Some(user) => Session::Authenticated(user),
        None => Session::Expired,
    };

    Ok(session)
}

/// A logged in user with the Admin role.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        match check_session(&state.store, &jar).await? {
            Session::Anonymous => Err(WebError::Unauthorized { expired: false }),

            Session::Expired => {
                debug!("Session token is not known anymore");
                Err(WebError::Unauthorized { expired: true })
            }

            Session::Authenticated(user) if user.is_admin() => Ok(AdminUser(user)),

            Session::Authenticated(user) => {
                warn!("User {} with role {:?} is not allowed to do this", user.id, user.role);
                Err(WebError::Forbidden)
            }
        }
    }
}

fn cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Adds the session cookies of a freshly logged in user.
pub fn start_session(jar: CookieJar, user: &User, token: &str, secure: bool) -> CookieJar {
    let mut auth = cookie(AUTH_COOKIE, token.to_owned(), secure);
    auth.set_http_only(true);

    jar.add(auth)
        .add(cookie(ROLE_COOKIE, user.role.clone(), secure))
        .add(cookie(USERNAME_COOKIE, user.name.clone(), secure))
        .add(cookie(USER_ID_COOKIE, user.id.to_string(), secure))
}

/// Tells the client to drop all session cookies.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    SESSION_COOKIES.into_iter().fold(jar, |jar, name| {
        let mut cookie = Cookie::build((name, "")).path("/").build();
        cookie.make_removal();
        jar.add(cookie)
    })
}
