use std::fmt::Display;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::net::ToSocketAddrs;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::CompressionLevel;
use tracing::{error, info, Level};

use crate::gallery::scale::ThumbnailScaler;
use crate::gallery::store::Store;

mod auth;
mod handlers;

pub use auth::{GoogleProvider, Identity, IdentityProvider};

pub struct Options<A> {
    pub store: Store,
    pub scaler: ThumbnailScaler,
    pub identity: Arc<dyn IdentityProvider>,
    pub addr: A,
    pub secure_cookies: bool,
    pub max_upload_size: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub scaler: ThumbnailScaler,
    pub identity: Arc<dyn IdentityProvider>,
    pub secure_cookies: bool,
}

pub fn router(state: AppState, max_upload_size: usize) -> Router {
    use handlers::{albums, login, photos, tags, users};

    let api = Router::new()
        .route("/photos", get(photos::list).post(photos::upload))
        .route("/photos/{id}", get(photos::get).put(photos::update).delete(photos::delete))
        .route("/photos/{id}/image", get(photos::image))
        .route("/photos/{id}/thumbnail", get(photos::thumbnail))
        .route("/photos/{id}/big_thumbnail", get(photos::big_thumbnail))
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}", get(users::get).put(users::update).delete(users::delete))
        .route("/albums", get(albums::list).post(albums::create))
        .route("/albums/{name}", get(albums::get).put(albums::update))
        .route("/tags", get(tags::list).post(tags::create))
        .route("/tags/{name}", get(tags::get).put(tags::update))
        .route("/auth/google/login", get(login::login))
        .route("/auth/google/return", get(login::callback))
        .route("/auth/logout", get(login::logout));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(CompressionLayer::new().gzip(true).quality(CompressionLevel::Fastest))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn serve<A>(opts: Options<A>) -> Result<()>
where
    A: ToSocketAddrs + Display,
{
    let state = AppState {
        store: opts.store,
        scaler: opts.scaler,
        identity: opts.identity,
        secure_cookies: opts.secure_cookies,
    };

    let app = router(state, opts.max_upload_size);

    info!("Starting webserver on http://{}/", opts.addr);
    let listener = tokio::net::TcpListener::bind(opts.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }

            Err(err) => {
                error!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use anyhow::bail;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, Response, StatusCode};
    use sqlx::SqlitePool;
    use tower::ServiceExt;

    use super::*;
    use crate::gallery::db::testing::{insert_album, insert_user, memory_pool};
    use crate::gallery::scale::{Options as ScaleOptions, Sizes};

    /// Knows a single account and accepts a single code.
    struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str) -> Result<String> {
            Ok(format!("https://id.example.com/auth?state={}", state))
        }

        async fn exchange(&self, code: &str) -> Result<String> {
            match code {
                "good" => Ok("fresh-token".into()),
                "stranger" => Ok("stranger-token".into()),
                _ => bail!("invalid code"),
            }
        }

        async fn identity(&self, token: &str) -> Result<Identity> {
            let email = match token {
                "fresh-token" => "admin@example.com",
                _ => "stranger@example.com",
            };

            Ok(Identity { email: email.into(), name: "Ada".into() })
        }
    }

    struct TestApp {
        db: SqlitePool,
        app: Router,
    }

    impl TestApp {
        async fn new() -> Self {
            let db = memory_pool().await;
            insert_user(&db, 7, "admin@example.com", "Admin", Some("abc")).await;
            insert_user(&db, 3, "user@example.com", "User", Some("xyz")).await;
            insert_album(&db, "Trips").await;

            let scaler = ThumbnailScaler::new(ScaleOptions {
                sizes: Sizes { thumb: 8, big_thumb: 32 },
                max_memory: NonZeroU64::new(1 << 20).unwrap(),
            });

            let state = AppState {
                store: Store::new(db.clone()),
                scaler,
                identity: Arc::new(FakeProvider),
                secure_cookies: false,
            };

            Self { db, app: router(state, 1 << 20) }
        }

        async fn send(&self, request: Request<Body>) -> Response<Body> {
            self.app.clone().oneshot(request).await.unwrap()
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("authentication={}", token));
        }

        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("authentication={}", token));
        }

        builder.body(Body::from(body.to_owned())).unwrap()
    }

    async fn json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_owned)
            .collect()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;
        use image::{ImageEncoder, Rgb, RgbImage};

        let image = RgbImage::from_pixel(width, height, Rgb([0, 0, 200]));

        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();

        buf
    }

    fn upload_request(token: &str, albums: &str, file: &[u8]) -> Request<Body> {
        upload_request_as(token, albums, file, "image/png")
    }

    fn upload_request_as(token: &str, albums: &str, file: &[u8], content_type: &str) -> Request<Body> {
        let boundary = "XxXboundaryXxX";

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"albums\"\r\n\r\n{albums}\r\n").as_bytes());
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"caption\"\r\n\r\nblue\r\n").as_bytes());
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blue.png\"\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/photos")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .header(header::COOKIE, format!("authentication={}", token))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn admin_deletes_user_and_expired_token_is_rejected() {
        let app = TestApp::new().await;

        let response = app.send(request("DELETE", "/api/users/3", Some("abc"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(request("DELETE", "/api/users/3", Some("expired"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cookies = set_cookies(&response);
        for name in ["authentication=", "role=", "username=", "user_id="] {
            assert!(cookies.iter().any(|c| c.starts_with(name)), "{} not cleared in {:?}", name, cookies);
        }
    }

    #[tokio::test]
    async fn admin_endpoints_check_the_role() {
        let app = TestApp::new().await;

        let response = app.send(request("GET", "/api/users", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(&response).is_empty());

        let response = app.send(request("GET", "/api/users", Some("xyz"))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.send(request("GET", "/api/users?count=1&skip=nonsense", Some("abc"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_and_malformed_ids() {
        let app = TestApp::new().await;

        let response = app.send(request("GET", "/api/photos/42", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.send(request("GET", "/api/photos/abc", None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(request("GET", "/api/photos/42/thumbnail", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.send(request("DELETE", "/api/users/99", Some("abc"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.send(json_request("PUT", "/api/photos/42", Some("abc"), r#"{"caption": "x", "albums": []}"#)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let app = TestApp::new().await;

        let response = app.send(json_request("POST", "/api/users", Some("abc"), "{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(json_request("POST", "/api/users", Some("abc"), r#"{"email": 1}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(json_request("POST", "/api/users", Some("abc"), r#"{"email": "new@example.com", "role": "User"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["email"], "new@example.com");
    }

    #[tokio::test]
    async fn upload_update_and_download() {
        let app = TestApp::new().await;

        let response = app.send(upload_request("abc", r#"["Trips"]"#, &png(64, 32))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let photo = json(response).await;
        assert_eq!(photo["filename"], "blue.png");
        assert_eq!(photo["mimetype"], "image/png");
        assert_eq!(photo["caption"], "blue");
        assert_eq!(photo["author_id"], 7);
        assert_eq!(photo["albums"], serde_json::json!(["Trips"]));

        let id = photo["id"].as_i64().unwrap();

        let response = app.send(request("GET", &format!("/api/photos/{}/thumbnail", id), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert!(response.headers()[header::CACHE_CONTROL].to_str().unwrap().contains("immutable"));

        let response = app.send(request("GET", &format!("/api/photos/{}/image", id), None)).await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let body = r#"{"caption": "renamed", "albums": ["Trips"]}"#;
        let response = app.send(json_request("PUT", &format!("/api/photos/{}", id), Some("abc"), body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let photo = json(response).await;
        assert_eq!(photo["caption"], "renamed");
        assert_eq!(photo["albums"], serde_json::json!(["Trips"]));

        // without albums the update would drop every membership
        let response = app.send(json_request("PUT", &format!("/api/photos/{}", id), Some("abc"), r#"{"caption": "x"}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(request("GET", "/api/photos?album=Trips&count=10", None)).await;
        assert_eq!(json(response).await.as_array().unwrap().len(), 1);

        let response = app.send(request("GET", "/api/albums/Trips", None)).await;
        let album = json(response).await;
        assert_eq!(album["image_count"], 1);
        assert!(album["cover_image_id"].is_null());

        let response = app.send(request("DELETE", &format!("/api/photos/{}", id), Some("abc"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn uploads_must_be_images() {
        let app = TestApp::new().await;

        let response = app.send(upload_request("abc", r#"["Trips"]"#, b"plain text")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(upload_request("abc", "Trips", &png(8, 8))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(upload_request("xyz", r#"["Trips"]"#, &png(8, 8))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stored_mime_type_follows_the_content() {
        let app = TestApp::new().await;

        let response = app.send(upload_request_as("abc", "[]", &png(16, 16), "text/html")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let photo = json(response).await;
        assert_eq!(photo["mimetype"], "image/png");

        let id = photo["id"].as_i64().unwrap();
        let response = app.send(request("GET", &format!("/api/photos/{}/image", id), None)).await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn album_lifecycle() {
        let app = TestApp::new().await;

        let response = app.send(json_request("POST", "/api/albums", Some("abc"), r#"{"name": "Beach"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(json_request("PUT", "/api/albums/Beach", Some("abc"), r#"{"name": "Coast", "cover_image_id": null}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["name"], "Coast");

        let response = app.send(request("GET", "/api/albums", None)).await;
        let names: Vec<_> = json(response).await
            .as_array()
            .unwrap()
            .iter()
            .map(|album| album["name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["Coast", "Trips"]);

        let response = app.send(json_request("PUT", "/api/albums/Missing", Some("abc"), r#"{"name": "x"}"#)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.send(json_request("POST", "/api/tags", None, r#"{"name": "Family"}"#)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(json_request("POST", "/api/tags", Some("abc"), r#"{"name": "Family"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(request("GET", "/api/tags/Family", None)).await;
        assert_eq!(json(response).await["image_count"], 0);
    }

    #[tokio::test]
    async fn login_flow() {
        let app = TestApp::new().await;

        let response = app.send(request("GET", "/api/auth/google/login", None)).await;
        assert!(response.status().is_redirection());

        let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();
        let csrf = location.split("state=").nth(1).unwrap().to_owned();
        assert_eq!(csrf.len(), 32);

        // the state must come back unchanged
        let uri = format!("/api/auth/google/return?code=good&state={}", csrf);
        let mut callback = request("GET", &uri, None);
        callback.headers_mut().insert(header::COOKIE, "oauth_state=forged".parse().unwrap());
        assert_eq!(app.send(callback).await.status(), StatusCode::BAD_REQUEST);

        let with_state = |code: &str| {
            let uri = format!("/api/auth/google/return?code={}&state={}", code, csrf);
            let mut request = request("GET", &uri, None);
            request.headers_mut().insert(header::COOKIE, format!("oauth_state={}", csrf).parse().unwrap());
            request
        };

        assert_eq!(app.send(with_state("bad")).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.send(with_state("stranger")).await.status(), StatusCode::FORBIDDEN);

        let response = app.send(with_state("good")).await;
        assert!(response.status().is_redirection());

        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("authentication=fresh-token")));
        assert!(cookies.iter().any(|c| c.starts_with("role=Admin")));
        assert!(cookies.iter().any(|c| c.starts_with("user_id=7")));

        let response = app.send(request("GET", "/api/users", Some("fresh-token"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        // the token of the previous login was replaced
        let response = app.send(request("GET", "/api/users", Some("abc"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(request("GET", "/api/auth/logout", Some("fresh-token"))).await;
        assert!(response.status().is_redirection());
        assert!(set_cookies(&response).iter().any(|c| c.starts_with("authentication=;")));

        let token: Option<String> = sqlx::query_scalar("SELECT token FROM users WHERE id = 7")
            .fetch_one(&app.db)
            .await
            .unwrap();

        assert_eq!(token, None);
    }
}
