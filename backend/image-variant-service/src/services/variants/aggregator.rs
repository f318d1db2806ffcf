//! Result aggregator - assembles the job result in planning order

use super::keys::output_key;
use crate::models::{
    ImageMetadata, Job, JobResult, JobStatus, TierName, VariantResult, VariantSpec,
};

/// Build the job result
///
/// `results` are expected in planning order, one per planned spec. A planned spec
/// without a matching result is reported as failed so it is never silently dropped.
pub fn aggregate(
    job: &Job,
    tier: TierName,
    source: ImageMetadata,
    planned: &[VariantSpec],
    results: Vec<VariantResult>,
) -> JobResult {
    let mut results = results.into_iter();
    let variants: Vec<VariantResult> = planned
        .iter()
        .map(|spec| match results.next() {
            Some(result)
                if result.target_width == spec.target_width
                    && result.output_format == spec.output_format =>
            {
                result
            }
            _ => VariantResult::failure(
                *spec,
                output_key(job.key(), spec.target_width, spec.output_format),
                "variant was not rendered".to_string(),
            ),
        })
        .collect();

    let succeeded = variants.iter().filter(|v| v.succeeded).count();
    let failed = variants.len() - succeeded;
    let status = if failed == 0 {
        JobStatus::Completed
    } else {
        JobStatus::Degraded
    };

    JobResult {
        bucket: job.bucket().to_string(),
        key: job.key().to_string(),
        tier,
        source,
        status,
        succeeded,
        failed,
        variants,
    }
}
