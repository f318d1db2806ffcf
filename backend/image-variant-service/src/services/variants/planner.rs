//! Variant planner - decides which width/format combinations to render

use super::keys::output_key;
use crate::config::VariantConfig;
use crate::models::{ImageCodec, ImageMetadata, OutputFormat, TargetWidth, VariantSpec};
use tracing::debug;

/// Compute the ordered list of variants for a source image stored under `key`
///
/// Widths at or above the source width are dropped (no upscaling). Every surviving width
/// gets one spec per configured format, then one original-width spec per format is
/// appended. A format is planned once per width: it is skipped when it resolves to an
/// already planned codec or would write to an already planned output key.
pub fn plan_variants(
    key: &str,
    metadata: &ImageMetadata,
    config: &VariantConfig,
) -> Vec<VariantSpec> {
    let mut specs =
        Vec::with_capacity((config.target_widths.len() + 1) * config.output_formats.len());

    for &width in &config.target_widths {
        if width >= metadata.width {
            debug!(
                target_width = width,
                source_width = metadata.width,
                "Skipping width, would upscale"
            );
            continue;
        }
        push_formats(
            &mut specs,
            key,
            TargetWidth::Pixels(width),
            metadata,
            &config.output_formats,
        );
    }

    push_formats(
        &mut specs,
        key,
        TargetWidth::Original,
        metadata,
        &config.output_formats,
    );
    specs
}

fn push_formats(
    specs: &mut Vec<VariantSpec>,
    key: &str,
    target_width: TargetWidth,
    metadata: &ImageMetadata,
    formats: &[OutputFormat],
) {
    let mut codecs: Vec<ImageCodec> = Vec::with_capacity(formats.len());
    let mut keys: Vec<String> = Vec::with_capacity(formats.len());
    for &output_format in formats {
        let codec = output_format.resolve(metadata.source_format);
        if codecs.contains(&codec) {
            debug!(
                format = %output_format,
                codec = %codec,
                "Format duplicates an already planned codec"
            );
            continue;
        }

        // the key extension, not the decoded codec, names original-preserving outputs
        let variant_key = output_key(key, target_width, output_format);
        if keys.contains(&variant_key) {
            debug!(
                format = %output_format,
                output_key = %variant_key,
                "Format duplicates an already planned output key"
            );
            continue;
        }

        codecs.push(codec);
        keys.push(variant_key);
        specs.push(VariantSpec {
            target_width,
            output_format,
        });
    }
}
