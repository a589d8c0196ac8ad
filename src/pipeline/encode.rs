//! Image encoding: `DynamicImage` → PNG or JPEG bytes.
//!
//! PDFium hands back RGBA bitmaps. PNG keeps them as-is; JPEG has no alpha
//! channel, so the bitmap is flattened to RGB first or the encoder refuses it.

use crate::config::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Quality used for JPEG pages. High enough that rendered text stays crisp.
pub const JPEG_QUALITY: u8 = 90;

/// Encode a rasterised page in the requested format.
pub fn encode_page(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), format.image_format())?;
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
        }
    }

    debug!(
        "Encoded {}x{} page → {} bytes {}",
        img.width(),
        img.height(),
        buf.len(),
        format
    );
    Ok(buf)
}
