//! Codec capability used by the renderer
//!
//! `image` handles JPEG, PNG, TIFF and AVIF; lossy WebP goes through libwebp (`webp`
//! crate) because `image` only writes lossless WebP.

use crate::error::VariantError;
use crate::models::ImageCodec;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::DynamicImage;
use std::io::Cursor;

/// AVIF speed/quality trade-off: 1 is slowest, 10 fastest
const AVIF_SPEED: u8 = 8;

/// Largest width or height a WebP bitstream can carry
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Encodes a frame into a codec's byte representation
pub trait VariantEncoder: Send + Sync {
    /// `quality` is 1-100 and is ignored by lossless codecs
    fn encode(
        &self,
        image: &DynamicImage,
        codec: ImageCodec,
        quality: u8,
    ) -> Result<Vec<u8>, VariantError>;
}

/// Default encoder backed by the `image` and `webp` crates
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateEncoder;

impl VariantEncoder for ImageCrateEncoder {
    fn encode(
        &self,
        image: &DynamicImage,
        codec: ImageCodec,
        quality: u8,
    ) -> Result<Vec<u8>, VariantError> {
        let quality = quality.clamp(1, 100);
        let mut buf = Vec::new();

        match codec {
            ImageCodec::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
            }
            ImageCodec::Png => {
                to_rgb_or_rgba(image).write_with_encoder(PngEncoder::new(&mut buf))?;
            }
            ImageCodec::Tiff => {
                to_rgb_or_rgba(image)
                    .write_with_encoder(TiffEncoder::new(Cursor::new(&mut buf)))?;
            }
            ImageCodec::Avif => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
                    &mut buf, AVIF_SPEED, quality,
                ))?;
            }
            ImageCodec::Webp => buf = encode_webp(image, quality)?,
        }

        if buf.is_empty() {
            return Err(VariantError::Encode(format!("{codec} encoder produced no data")));
        }
        Ok(buf)
    }
}

/// Lossy WebP through libwebp's fallible entry point; frames above the format limit are
/// refused before reaching the encoder
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, VariantError> {
    let (width, height) = (image.width(), image.height());
    if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
        return Err(VariantError::Encode(format!(
            "{width}x{height} exceeds the WebP limit of {WEBP_MAX_DIMENSION} px per side"
        )));
    }

    let quality = f32::from(quality);
    let encoded = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, quality)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, quality)
    };

    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| VariantError::Encode(format!("webp encoding failed: {e:?}")))
}

fn to_rgb_or_rgba(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}
