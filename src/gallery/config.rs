use std::fs::File;
use std::num::NonZeroU64;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotosConfig {
    pub http_address: String,

    // sqlite database url
    pub database: String,

    pub thumb_size: u32,
    pub big_thumb_size: u32,

    /// Largest accepted upload in bytes.
    #[serde(default = "max_upload_size_default")]
    pub max_upload_size: usize,

    /// Upper bound for decoded image data held in memory while rendering thumbnails.
    #[serde(default = "thumbnail_memory_default")]
    pub thumbnail_memory: NonZeroU64,

    /// Public host name used in the oauth redirect url, e.g. `https://photos.example.com`
    pub local_host_name: String,

    #[serde(default = "secure_cookies_default")]
    pub secure_cookies: bool,

    pub oauth: OAuthConfig,

    /// Emails that get an Admin account at startup if they have none yet.
    #[serde(default)]
    pub default_admins: Vec<String>,

    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

pub fn load(path: impl AsRef<Path>) -> Result<PhotosConfig> {
    let path = path.as_ref();

    let fp = File::open(path).with_context(|| format!("open config file {:?}", path))?;
    let config = serde_yaml::from_reader(fp).with_context(|| format!("parse config file {:?}", path))?;
    Ok(config)
}

fn max_upload_size_default() -> usize {
    64 * 1024 * 1024
}

fn thumbnail_memory_default() -> NonZeroU64 {
    NonZeroU64::new(512 * 1024 * 1024).unwrap_or(NonZeroU64::MIN)
}

fn secure_cookies_default() -> bool {
    true
}
