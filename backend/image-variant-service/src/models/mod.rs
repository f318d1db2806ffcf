//! Core data models for variant generation
//!
//! Everything here is plain data: created per job, shared read-only, dropped when the
//! job result has been reported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an object lives in the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub key: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One unit of work derived from a single inbound notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    location: StorageLocation,
    size_bytes: u64,
}

impl Job {
    /// Build a job from already-validated parts. Use the job decoder for raw payloads.
    pub(crate) fn new(location: StorageLocation, size_bytes: u64) -> Self {
        Self {
            location,
            size_bytes,
        }
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    pub fn bucket(&self) -> &str {
        &self.location.bucket
    }

    pub fn key(&self) -> &str {
        &self.location.key
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Resource tier names, in ascending size order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Tier1,
    Tier2,
    Tier3,
}

impl TierName {
    pub const ALL: [TierName; 3] = [TierName::Tier1, TierName::Tier2, TierName::Tier3];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Tier1 => "tier1",
            TierName::Tier2 => "tier2",
            TierName::Tier3 => "tier3",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tier1" | "1" => Some(TierName::Tier1),
            "tier2" | "2" => Some(TierName::Tier2),
            "tier3" | "3" => Some(TierName::Tier3),
            _ => None,
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec family of a source image or of an encoded variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCodec {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Avif,
}

impl ImageCodec {
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageCodec::Jpeg),
            image::ImageFormat::Png => Some(ImageCodec::Png),
            image::ImageFormat::WebP => Some(ImageCodec::Webp),
            image::ImageFormat::Tiff => Some(ImageCodec::Tiff),
            image::ImageFormat::Avif => Some(ImageCodec::Avif),
            _ => None,
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ImageCodec::Jpeg => image::ImageFormat::Jpeg,
            ImageCodec::Png => image::ImageFormat::Png,
            ImageCodec::Webp => image::ImageFormat::WebP,
            ImageCodec::Tiff => image::ImageFormat::Tiff,
            ImageCodec::Avif => image::ImageFormat::Avif,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageCodec::Jpeg => "image/jpeg",
            ImageCodec::Png => "image/png",
            ImageCodec::Webp => "image/webp",
            ImageCodec::Tiff => "image/tiff",
            ImageCodec::Avif => "image/avif",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCodec::Jpeg => "jpeg",
            ImageCodec::Png => "png",
            ImageCodec::Webp => "webp",
            ImageCodec::Tiff => "tiff",
            ImageCodec::Avif => "avif",
        }
    }
}

impl fmt::Display for ImageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color interpretation of decoded pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    Srgb,
    Rgb16,
    RgbFloat,
    #[serde(rename = "b-w")]
    Grayscale,
    Grey16,
}

impl ColorSpace {
    pub fn from_color_type(color: image::ColorType) -> Self {
        use image::ColorType;
        match color {
            ColorType::L8 | ColorType::La8 => ColorSpace::Grayscale,
            ColorType::L16 | ColorType::La16 => ColorSpace::Grey16,
            ColorType::Rgb16 | ColorType::Rgba16 => ColorSpace::Rgb16,
            ColorType::Rgb32F | ColorType::Rgba32F => ColorSpace::RgbFloat,
            _ => ColorSpace::Srgb,
        }
    }
}

/// Metadata extracted by the single full decode of a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub source_format: ImageCodec,
    pub color_space: ColorSpace,
    pub channels: u8,
}

impl ImageMetadata {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Requested output width of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetWidth {
    /// Render at the source width, no resize
    Original,
    Pixels(u32),
}

impl Serialize for TargetWidth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TargetWidth::Original => serializer.serialize_str("original"),
            TargetWidth::Pixels(px) => serializer.serialize_u32(*px),
        }
    }
}

impl fmt::Display for TargetWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetWidth::Original => f.write_str("original"),
            TargetWidth::Pixels(px) => write!(f, "{px}w"),
        }
    }
}

/// Output format family of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// Re-encode with the source's own codec family
    OriginalPreserving,
    Webp,
}

impl OutputFormat {
    /// Codec actually used for a given source
    pub fn resolve(&self, source: ImageCodec) -> ImageCodec {
        match self {
            OutputFormat::OriginalPreserving => source,
            OutputFormat::Webp => ImageCodec::Webp,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "original" | "originalpreserving" | "original-preserving" => {
                Some(OutputFormat::OriginalPreserving)
            }
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::OriginalPreserving => f.write_str("original"),
            OutputFormat::Webp => f.write_str("webp"),
        }
    }
}

/// One planned variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSpec {
    pub target_width: TargetWidth,
    pub output_format: OutputFormat,
}

/// Outcome of rendering one planned variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResult {
    pub target_width: TargetWidth,
    pub output_format: OutputFormat,
    pub output_key: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_byte_count: Option<u64>,
}

impl VariantResult {
    pub fn success(
        spec: VariantSpec,
        output_key: String,
        width: u32,
        height: u32,
        output_byte_count: u64,
    ) -> Self {
        Self {
            target_width: spec.target_width,
            output_format: spec.output_format,
            output_key,
            succeeded: true,
            width: Some(width),
            height: Some(height),
            error_message: None,
            output_byte_count: Some(output_byte_count),
        }
    }

    pub fn failure(spec: VariantSpec, output_key: String, error_message: String) -> Self {
        Self {
            target_width: spec.target_width,
            output_format: spec.output_format,
            output_key,
            succeeded: false,
            width: None,
            height: None,
            error_message: Some(error_message),
            output_byte_count: None,
        }
    }
}

/// Job-level outcome once rendering has been reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Every planned variant succeeded
    Completed,
    /// Some variants failed; still a job-level success
    Degraded,
}

/// Result record for a job that reached the rendering phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub bucket: String,
    pub key: String,
    pub tier: TierName,
    pub source: ImageMetadata,
    pub status: JobStatus,
    pub succeeded: usize,
    pub failed: usize,
    /// In planning order, one entry per planned spec
    pub variants: Vec<VariantResult>,
}

/// Lifecycle of a job inside one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Validated,
    MetadataProbed,
    Planned,
    Rendering,
    Completed,
    Failed,
}

impl JobState {
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, MetadataProbed)
                | (MetadataProbed, Planned)
                | (Planned, Rendering)
                | (Rendering, Completed)
                | (Received, Failed)
                | (Validated, Failed)
                | (MetadataProbed, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::MetadataProbed => "metadata_probed",
            JobState::Planned => "planned",
            JobState::Rendering => "rendering",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_happy_path() {
        let path = [
            JobState::Received,
            JobState::Validated,
            JobState::MetadataProbed,
            JobState::Planned,
            JobState::Rendering,
            JobState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(JobState::Completed.is_terminal());
    }

    #[test]
    fn test_job_state_no_failure_after_planning() {
        assert!(JobState::MetadataProbed.can_transition_to(JobState::Failed));
        assert!(!JobState::Planned.can_transition_to(JobState::Failed));
        assert!(!JobState::Rendering.can_transition_to(JobState::Failed));
        assert!(!JobState::Completed.can_transition_to(JobState::Rendering));
    }

    #[test]
    fn test_output_format_resolution() {
        assert_eq!(
            OutputFormat::OriginalPreserving.resolve(ImageCodec::Png),
            ImageCodec::Png
        );
        assert_eq!(OutputFormat::Webp.resolve(ImageCodec::Png), ImageCodec::Webp);
    }

    #[test]
    fn test_target_width_serialization() {
        let spec = VariantSpec {
            target_width: TargetWidth::Pixels(700),
            output_format: OutputFormat::Webp,
        };
        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json["targetWidth"], 700);
        assert_eq!(json["outputFormat"], "webp");

        let original = serde_json::to_value(TargetWidth::Original).unwrap();
        assert_eq!(original, "original");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(TierName::parse("Tier2"), Some(TierName::Tier2));
        assert_eq!(TierName::parse("gold"), None);
        assert_eq!(
            OutputFormat::parse(" original "),
            Some(OutputFormat::OriginalPreserving)
        );
        assert_eq!(OutputFormat::parse("gif"), None);
    }
}
