//! Variant renderer - resize, encode and upload one planned variant
//!
//! `render` is the failure boundary of a single variant: whatever goes wrong inside it is
//! captured in the returned `VariantResult` and never reaches sibling variants.
//! CPU-heavy work runs on the blocking pool so the async runtime stays responsive.

use super::encoder::VariantEncoder;
use super::keys::output_key;
use super::prober::SourceImage;
use crate::config::VariantConfig;
use crate::error::VariantError;
use crate::models::{
    ImageCodec, ImageMetadata, StorageLocation, TargetWidth, VariantResult, VariantSpec,
};
use crate::storage::{ObjectStore, PutOptions};
use bytes::Bytes;
use chrono::Utc;
use image::imageops::FilterType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// An encoded variant ready for upload
#[derive(Debug)]
pub struct RenderedVariant {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub codec: ImageCodec,
}

/// Compute output dimensions, preserving the aspect ratio
///
/// Height is `round(width * source_height / source_width)`, at least 1. Asking for a width
/// at or above the source width is a planner bug and is rejected, not clamped.
pub fn target_dimensions(
    metadata: &ImageMetadata,
    target: TargetWidth,
) -> Result<(u32, u32), VariantError> {
    match target {
        TargetWidth::Original => Ok((metadata.width, metadata.height)),
        TargetWidth::Pixels(width) => {
            if width >= metadata.width {
                return Err(VariantError::Upscale {
                    target: width,
                    source_width: metadata.width,
                });
            }
            if width == 0 {
                return Err(VariantError::Render("target width is zero".to_string()));
            }
            let numerator =
                u64::from(width) * u64::from(metadata.height) * 2 + u64::from(metadata.width);
            let height = numerator / (u64::from(metadata.width) * 2);
            Ok((width, u32::try_from(height.max(1)).unwrap_or(u32::MAX)))
        }
    }
}

/// Resize (when needed) and encode one frame (blocking)
pub fn render_frame(
    source: &SourceImage,
    width: u32,
    height: u32,
    codec: ImageCodec,
    quality: u8,
    encoder: &dyn VariantEncoder,
) -> Result<RenderedVariant, VariantError> {
    let metadata = source.metadata();
    let data = if (width, height) == (metadata.width, metadata.height) {
        encoder.encode(source.image(), codec, quality)?
    } else {
        let resized = source.image().resize_exact(width, height, FilterType::Lanczos3);
        encoder.encode(&resized, codec, quality)?
    };

    Ok(RenderedVariant {
        data: Bytes::from(data),
        width,
        height,
        codec,
    })
}

/// Renders and uploads variants of one source
#[derive(Clone)]
pub struct VariantRenderer {
    store: Arc<dyn ObjectStore>,
    encoder: Arc<dyn VariantEncoder>,
}

impl VariantRenderer {
    pub fn new(store: Arc<dyn ObjectStore>, encoder: Arc<dyn VariantEncoder>) -> Self {
        Self { store, encoder }
    }

    /// Render one spec; never fails, failures are recorded in the result
    pub async fn render(
        &self,
        job_location: &StorageLocation,
        source: &Arc<SourceImage>,
        spec: VariantSpec,
        config: &VariantConfig,
    ) -> VariantResult {
        let key = output_key(&job_location.key, spec.target_width, spec.output_format);

        match self.try_render(job_location, &key, source, spec, config).await {
            Ok(rendered) => {
                debug!(
                    output_key = %key,
                    width = rendered.width,
                    height = rendered.height,
                    format = %rendered.codec,
                    size = rendered.data.len(),
                    "Variant uploaded"
                );
                VariantResult::success(
                    spec,
                    key,
                    rendered.width,
                    rendered.height,
                    rendered.data.len() as u64,
                )
            }
            Err(e) => {
                warn!(
                    output_key = %key,
                    target_width = %spec.target_width,
                    format = %spec.output_format,
                    error = %e,
                    "Variant failed"
                );
                VariantResult::failure(spec, key, e.to_string())
            }
        }
    }

    async fn try_render(
        &self,
        job_location: &StorageLocation,
        key: &str,
        source: &Arc<SourceImage>,
        spec: VariantSpec,
        config: &VariantConfig,
    ) -> Result<RenderedVariant, VariantError> {
        let metadata = *source.metadata();
        let (width, height) = target_dimensions(&metadata, spec.target_width)?;
        let codec = spec.output_format.resolve(metadata.source_format);
        let quality = config.quality;

        let frame_source = Arc::clone(source);
        let encoder = Arc::clone(&self.encoder);
        let rendered = tokio::task::spawn_blocking(move || {
            render_frame(&frame_source, width, height, codec, quality, encoder.as_ref())
        })
        .await
        .map_err(|e| VariantError::Render(format!("render task panicked: {e}")))??;

        let options = PutOptions {
            content_type: codec.content_type().to_string(),
            cache_control: config.cache_control.clone(),
            metadata: HashMap::from([
                ("sourceKey".to_string(), job_location.key.clone()),
                ("width".to_string(), width.to_string()),
                ("height".to_string(), height.to_string()),
                ("format".to_string(), codec.as_str().to_string()),
                ("processedAt".to_string(), Utc::now().to_rfc3339()),
            ]),
        };

        let destination = StorageLocation::new(job_location.bucket.clone(), key);
        self.store
            .put_object(&destination, rendered.data.clone(), options)
            .await?;

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorSpace, OutputFormat};
    use crate::services::variants::encoder::ImageCrateEncoder;
    use crate::storage::InMemoryObjectStore;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn metadata(width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            width,
            height,
            source_format: ImageCodec::Jpeg,
            color_space: ColorSpace::Srgb,
            channels: 3,
        }
    }

    fn jpeg_source(width: u32, height: u32) -> Arc<SourceImage> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        Arc::new(SourceImage::decode(Bytes::from(buf)).unwrap())
    }

    #[test]
    fn test_target_dimensions() {
        let source = metadata(2000, 1000);
        assert_eq!(
            target_dimensions(&source, TargetWidth::Pixels(700)).unwrap(),
            (700, 350)
        );
        assert_eq!(
            target_dimensions(&source, TargetWidth::Original).unwrap(),
            (2000, 1000)
        );
        // 1333 * 1000 / 2000 = 666.5 rounds up
        assert_eq!(
            target_dimensions(&source, TargetWidth::Pixels(1333)).unwrap(),
            (1333, 667)
        );
        // very wide sources never collapse to zero height
        assert_eq!(
            target_dimensions(&metadata(10_000, 3), TargetWidth::Pixels(10)).unwrap(),
            (10, 1)
        );
    }

    #[test]
    fn test_upscale_is_rejected() {
        let source = metadata(800, 600);
        assert!(matches!(
            target_dimensions(&source, TargetWidth::Pixels(800)),
            Err(VariantError::Upscale { .. })
        ));
        assert!(matches!(
            target_dimensions(&source, TargetWidth::Pixels(1200)),
            Err(VariantError::Upscale { .. })
        ));
    }

    #[test]
    fn test_aspect_ratio_within_tolerance() {
        // rounding error on the height is at most half a pixel, so widths >= 100 stay < 0.01
        for (w, h) in [(2000, 1000), (1920, 1080), (1234, 4321), (3000, 2001)] {
            let source = metadata(w, h);
            for target in [100, 333, 700, 1000] {
                let (tw, th) = target_dimensions(&source, TargetWidth::Pixels(target)).unwrap();
                assert!(tw < w);
                let ratio = f64::from(th) / f64::from(tw);
                let expected = f64::from(h) / f64::from(w);
                assert!((ratio - expected).abs() < 0.01, "{w}x{h} -> {tw}x{th}");
            }
        }
    }

    #[tokio::test]
    async fn test_render_uploads_with_headers() {
        let store = Arc::new(InMemoryObjectStore::new());
        let renderer = VariantRenderer::new(store.clone(), Arc::new(ImageCrateEncoder));
        let location = StorageLocation::new("media", "photos/cat.jpg");
        let source = jpeg_source(400, 200);
        let spec = VariantSpec {
            target_width: TargetWidth::Pixels(100),
            output_format: OutputFormat::Webp,
        };

        let result = renderer
            .render(&location, &source, spec, &VariantConfig::default())
            .await;
        assert!(result.succeeded, "{:?}", result.error_message);
        assert_eq!(result.output_key, "photos/cat-100w.webp");
        assert_eq!((result.width, result.height), (Some(100), Some(50)));

        let stored = store
            .object(&StorageLocation::new("media", "photos/cat-100w.webp"))
            .unwrap();
        assert_eq!(stored.options.content_type, "image/webp");
        assert_eq!(stored.options.cache_control, "public, max-age=31536000, immutable");
        assert_eq!(stored.options.metadata["sourceKey"], "photos/cat.jpg");
        assert_eq!(stored.options.metadata["width"], "100");
        assert_eq!(stored.options.metadata["height"], "50");
        assert_eq!(stored.options.metadata["format"], "webp");
        assert!(stored.options.metadata.contains_key("processedAt"));
        assert_eq!(result.output_byte_count, Some(stored.body.len() as u64));

        let decoded = image::load_from_memory(&stored.body).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[tokio::test]
    async fn test_upload_failure_is_recorded() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.fail_puts_for("cat-100w.jpg");
        let renderer = VariantRenderer::new(store.clone(), Arc::new(ImageCrateEncoder));
        let spec = VariantSpec {
            target_width: TargetWidth::Pixels(100),
            output_format: OutputFormat::OriginalPreserving,
        };

        let result = renderer
            .render(
                &StorageLocation::new("media", "cat.jpg"),
                &jpeg_source(300, 300),
                spec,
                &VariantConfig::default(),
            )
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.output_key, "cat-100w.jpg");
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Upload failed"));
        assert_eq!(store.put_count(), 0);
    }
}
