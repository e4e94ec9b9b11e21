use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tracing::{debug, instrument};

const JPEG_QUALITY: u8 = 85;

/// Format and dimensions of an encoded image, read without decoding the pixels.
#[derive(Clone, Debug)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Number of bytes the decoded RGBA pixels will occupy.
    pub fn decoded_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

pub fn inspect(bytes: &[u8]) -> Result<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;

    let format = reader
        .format()
        .ok_or_else(|| anyhow!("unknown image format"))?;

    let (width, height) = reader.into_dimensions()?;

    Ok(ImageInfo { format, width, height })
}

/// Decodes an image and rotates it upright according to its EXIF orientation.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()
        .context("open image decoder")?;

    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder).context("decode image")?;
    image.apply_orientation(orientation);

    Ok(image)
}

/// Scales the image to fit into a `size` x `size` box and encodes it as jpeg.
#[instrument(skip_all, fields(size))]
pub fn thumbnail(image: &DynamicImage, size: u32) -> Result<Vec<u8>> {
    let scaled = if image.width() <= size && image.height() <= size {
        image.clone()
    } else {
        image.thumbnail(size, size)
    };

    debug!("Scaled to {}x{}", scaled.width(), scaled.height());

    // jpeg has no alpha channel
    let scaled = DynamicImage::ImageRgb8(scaled.to_rgb8());

    let mut buf = Vec::new();
    scaled.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;

    Ok(buf)
}

/// Decodes the image once and renders one thumbnail per requested size.
pub fn render(bytes: &[u8], sizes: &[u32]) -> Result<Vec<Vec<u8>>> {
    let image = decode(bytes)?;

    sizes.iter()
        .map(|size| thumbnail(&image, *size))
        .collect()
}

#[cfg(test)]
mod tests {
    use image::{ImageEncoder, Rgb, RgbImage};
    use image::codecs::png::PngEncoder;

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));

        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();

        buf
    }

    #[test]
    fn inspect_reads_format_and_dimensions() {
        let info = inspect(&png(64, 32)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!((info.width, info.height), (64, 32));
        assert_eq!(info.decoded_size(), 64 * 32 * 4);
        assert_eq!(info.mime_type(), "image/png");
    }

    #[test]
    fn inspect_rejects_garbage() {
        assert!(inspect(b"definitely not an image").is_err());
    }

    #[test]
    fn thumbnails_keep_aspect_ratio() {
        let rendered = render(&png(200, 100), &[50, 400]).unwrap();
        assert_eq!(rendered.len(), 2);

        let small = inspect(&rendered[0]).unwrap();
        assert_eq!(small.format, ImageFormat::Jpeg);
        assert_eq!((small.width, small.height), (50, 25));

        // never scaled beyond the original size
        let big = inspect(&rendered[1]).unwrap();
        assert_eq!((big.width, big.height), (200, 100));
    }
}
