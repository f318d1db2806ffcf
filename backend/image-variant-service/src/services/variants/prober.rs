//! Metadata prober - fetches the source once and decodes it once
//!
//! The decoded frame and the fetched bytes are kept together in a `SourceImage` that every
//! variant render of the job borrows through an `Arc`.

use crate::error::{JobError, Result};
use crate::models::{ColorSpace, ImageCodec, ImageMetadata, StorageLocation};
use crate::storage::ObjectStore;
use bytes::Bytes;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Decoded source image, shared read-only across the renders of one job
#[derive(Debug)]
pub struct SourceImage {
    bytes: Bytes,
    image: DynamicImage,
    metadata: ImageMetadata,
}

impl SourceImage {
    /// Decode raw bytes (blocking; CPU-bound)
    pub fn decode(bytes: Bytes) -> Result<Self> {
        if bytes.is_empty() {
            return Err(JobError::Decode("object is empty".to_string()));
        }

        let format = image::guess_format(&bytes)
            .map_err(|e| JobError::Decode(format!("unrecognized image data: {e}")))?;
        let source_format = ImageCodec::from_image_format(format)
            .ok_or_else(|| JobError::Decode(format!("unsupported source codec {format:?}")))?;

        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| JobError::Decode(format!("failed to decode {source_format}: {e}")))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(JobError::Decode("image has zero dimensions".to_string()));
        }

        let color = image.color();
        let metadata = ImageMetadata {
            width: image.width(),
            height: image.height(),
            source_format,
            color_space: ColorSpace::from_color_type(color),
            channels: color.channel_count(),
        };

        Ok(Self {
            bytes,
            image,
            metadata,
        })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }
}

/// Fetch the full object and decode it on the blocking pool
pub async fn probe(
    store: &dyn ObjectStore,
    location: &StorageLocation,
) -> Result<Arc<SourceImage>> {
    let bytes = store.get_object(location).await?;
    debug!(location = %location, size = bytes.len(), "Fetched source image");

    let source = tokio::task::spawn_blocking(move || SourceImage::decode(bytes))
        .await
        .map_err(|e| JobError::Decode(format!("decode task panicked: {e}")))??;

    debug!(
        location = %location,
        width = source.metadata.width,
        height = source.metadata.height,
        format = %source.metadata.source_format,
        "Probed source metadata"
    );

    Ok(Arc::new(source))
}
