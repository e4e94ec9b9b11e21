use std::sync::Arc;

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::gallery::scale::{Options, Sizes, ThumbnailScaler};
use crate::gallery::store::Store;
use crate::gallery_web::GoogleProvider;

pub mod gallery;
pub mod gallery_web;

const DEFAULT_CONFIG_PATH: &str = "./photos.config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let config = gallery::config::load(&path)?;

    let tracer_provider = init_tracing(config.otlp_endpoint.as_deref())?;

    info!("Open database {:?}", config.database);
    let db = gallery::db::connect(&config.database).await?;
    gallery::db::create_schema(&db).await?;
    gallery::db::seed_admins(&db, &config.default_admins).await?;

    let scaler = ThumbnailScaler::new(Options {
        sizes: Sizes {
            thumb: config.thumb_size,
            big_thumb: config.big_thumb_size,
        },
        max_memory: config.thumbnail_memory,
    });

    let identity = GoogleProvider::new(&config.oauth, &config.local_host_name)?;

    gallery_web::serve(gallery_web::Options {
        store: Store::new(db.clone()),
        scaler,
        identity: Arc::new(identity),
        addr: config.http_address.as_str(),
        secure_cookies: config.secure_cookies,
        max_upload_size: config.max_upload_size,
    }).await?;

    db.close().await;

    if let Some(provider) = tracer_provider {
        if let Err(err) = provider.shutdown() {
            warn!("Failed to flush traces: {}", err);
        }
    }

    Ok(())
}

/// Logs to stdout, filtered by `RUST_LOG`. With an otlp endpoint, spans are
/// exported there too.
fn init_tracing(otlp_endpoint: Option<&str>) -> Result<Option<SdkTracerProvider>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(Resource::builder().with_service_name("photos").build())
                .build();

            Some(provider)
        }

        None => None,
    };

    let otel = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("photos"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel)
        .init();

    if let Some(endpoint) = otlp_endpoint {
        info!("Exporting traces to {}", endpoint);
    }

    Ok(provider)
}
