use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tracing::{debug, instrument};

#[derive(Clone, Copy, Debug)]
pub struct Sizes {
    pub thumb: u32,
    pub big_thumb: u32,
}

#[derive(Clone)]
pub struct Options {
    pub sizes: Sizes,
    pub max_memory: NonZeroU64,
}

/// Both thumbnails of an uploaded image.
pub struct Thumbnails {
    /// Mime type of the uploaded image, as detected from its content.
    pub mimetype: &'static str,
    pub thumbnail: Vec<u8>,
    pub big_thumbnail: Vec<u8>,
}

/// Renders thumbnails on the blocking thread pool. The number of decoded
/// pixels in memory at the same time is limited by `max_memory`.
#[derive(Clone)]
pub struct ThumbnailScaler {
    options: Options,
    memory: Arc<Semaphore>,
}

impl ThumbnailScaler {
    pub fn new(options: Options) -> Self {
        let permits = usize::try_from(options.max_memory.get()).unwrap_or(Semaphore::MAX_PERMITS);

        ThumbnailScaler {
            memory: Arc::new(Semaphore::new(permits.min(Semaphore::MAX_PERMITS))),
            options,
        }
    }

    /// Renders the small and the big thumbnail. Fails if the bytes are not an
    /// image in a supported format.
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub async fn render(&self, bytes: Arc<Vec<u8>>) -> Result<Thumbnails> {
        let info = gallery_image::inspect(&bytes).context("inspect upload")?;
        debug!("Upload is {:?} with {}x{}", info.format, info.width, info.height);

        // memory to reserve
        let memory = self.options.max_memory.get().min(info.decoded_size());

        // reserve some bytes to load the image into memory
        let _guard = self.memory
            .acquire_many(u32::try_from(memory).unwrap_or(u32::MAX))
            .await?;

        let sizes = [self.options.sizes.thumb, self.options.sizes.big_thumb];

        // run resize in a different task to not block the executor
        let mut rendered = spawn_blocking(move || gallery_image::render(&bytes, &sizes)).await??;

        let big_thumbnail = rendered.pop().context("big thumbnail missing")?;
        let thumbnail = rendered.pop().context("thumbnail missing")?;

        Ok(Thumbnails { mimetype: info.mime_type(), thumbnail, big_thumbnail })
    }
}
