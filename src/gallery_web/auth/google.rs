use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::gallery::config::OAuthConfig;
use crate::gallery_web::auth::{Identity, IdentityProvider};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Login with a Google account using the oauth2 authorization code flow.
pub struct GoogleProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
    email_verified: Option<bool>,

    #[serde(default)]
    name: String,
}

impl GoogleProvider {
    /// `local_host_name` is the public base url of this server, the callback
    /// is served below it.
    pub fn new(config: &OAuthConfig, local_host_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: format!("{}/api/auth/google/return", local_host_name.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(AUTHORIZE_URL, &[
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
        ])?;

        Ok(url.into())
    }

    #[instrument(skip_all)]
    async fn exchange(&self, code: &str) -> Result<String> {
        let response: TokenResponse = self.client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode token response")?;

        Ok(response.access_token)
    }

    #[instrument(skip_all)]
    async fn identity(&self, token: &str) -> Result<Identity> {
        let info: UserInfo = self.client
            .get(USERINFO_URL)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode userinfo response")?;

        let Some(email) = info.email else {
            bail!("google account has no email address");
        };

        if info.email_verified == Some(false) {
            bail!("email address {:?} is not verified", email);
        }

        debug!("Google account is {:?}", email);

        Ok(Identity { email, name: info.name })
    }
}
