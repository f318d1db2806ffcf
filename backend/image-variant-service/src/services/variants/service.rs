//! Variant service - runs one job from notification to job result
//!
//! Workflow:
//! 1. Decode and validate the notification, select the tier
//! 2. Head the object, re-validate the tier against its real size
//! 3. Fetch and decode the source once
//! 4. Plan variants
//! 5. Render every planned variant with bounded parallelism, each in isolation
//! 6. Aggregate results in planning order
//!
//! Steps 1-3 abort the job on error. From step 4 on, the job always completes, possibly
//! degraded. The tier's timeout budget bounds the whole job.

use super::aggregator::aggregate;
use super::decoder::decode_job;
use super::encoder::VariantEncoder;
use super::keys::output_key;
use super::planner::plan_variants;
use super::prober::{probe, SourceImage};
use super::renderer::VariantRenderer;
use super::tier::{TierPolicy, TierProfile};
use crate::config::VariantConfig;
use crate::error::{JobError, Result, VariantError};
use crate::metrics;
use crate::models::{Job, JobResult, JobState, JobStatus, TierName, VariantResult, VariantSpec};
use crate::storage::ObjectStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinates the variant pipeline for jobs
pub struct VariantService {
    store: Arc<dyn ObjectStore>,
    renderer: VariantRenderer,
    tiers: TierPolicy,
    served_tier: Option<TierName>,
    config: VariantConfig,
}

impl VariantService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        encoder: Arc<dyn VariantEncoder>,
        tiers: TierPolicy,
        config: VariantConfig,
    ) -> Self {
        let renderer = VariantRenderer::new(store.clone(), encoder);
        Self {
            store,
            renderer,
            tiers,
            served_tier: None,
            config,
        }
    }

    /// Declare the tier whose capacity this worker runs on
    pub fn with_served_tier(mut self, served_tier: Option<TierName>) -> Self {
        self.served_tier = served_tier;
        self
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TierPolicy {
        &self.tiers
    }

    /// Decode a raw notification and process it with the service's configuration
    pub async fn process_notification(
        &self,
        payload: &[u8],
        routing_size: Option<u64>,
    ) -> Result<JobResult> {
        let job = decode_job(payload, routing_size).map_err(|e| {
            warn!(error = %e, "Rejected notification");
            metrics::record_job_failed(e.kind());
            e
        })?;
        self.process_job(&job, &self.config).await
    }

    /// Process a validated job with an explicit configuration
    pub async fn process_job(&self, job: &Job, config: &VariantConfig) -> Result<JobResult> {
        let started = Instant::now();
        let mut state = JobState::Received;

        match self.run(job, config, &mut state, started).await {
            Ok(result) => {
                transition(&mut state, JobState::Completed, job);
                metrics::record_job_completed(
                    result.tier.as_str(),
                    result.status == JobStatus::Degraded,
                    started.elapsed(),
                );
                info!(
                    bucket = %job.bucket(),
                    key = %job.key(),
                    tier = %result.tier,
                    succeeded = result.succeeded,
                    failed = result.failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                Ok(result)
            }
            Err(e) => {
                transition(&mut state, JobState::Failed, job);
                metrics::record_job_failed(e.kind());
                error!(
                    bucket = %job.bucket(),
                    key = %job.key(),
                    kind = e.kind(),
                    error = %e,
                    "Job failed"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &Job,
        config: &VariantConfig,
        state: &mut JobState,
        started: Instant,
    ) -> Result<JobResult> {
        let selected = self.tiers.select(job.size_bytes())?;
        let tier = self.effective_tier(job, selected);
        transition(state, JobState::Validated, job);

        let deadline = started + tier.timeout_budget;
        let timeout_secs = tier.timeout_budget.as_secs();

        let source = tokio::time::timeout_at(deadline, self.fetch_source(job))
            .await
            .map_err(|_| JobError::Timeout(timeout_secs))??;
        transition(state, JobState::MetadataProbed, job);

        let metadata = *source.metadata();
        let specs = plan_variants(job.key(), &metadata, config);
        transition(state, JobState::Planned, job);

        let parallelism = tier.render_parallelism(
            &metadata,
            source.bytes().len() as u64,
            config.render_concurrency,
        );
        debug!(
            key = %job.key(),
            planned = specs.len(),
            parallelism,
            "Rendering variants"
        );
        transition(state, JobState::Rendering, job);

        let results: Vec<VariantResult> = stream::iter(specs.iter().copied())
            .map(|spec| self.render_before_deadline(job, &source, spec, config, deadline))
            .buffered(parallelism)
            .collect()
            .await;

        for result in &results {
            metrics::record_variant(&result.output_format.to_string(), result.succeeded);
        }

        Ok(aggregate(job, tier.name, metadata, &specs, results))
    }

    /// Tier whose budget the job runs under
    ///
    /// A worker provisioned for one tier runs every job it receives under that tier's
    /// budget; misrouting only costs performance.
    fn effective_tier<'a>(&'a self, job: &Job, selected: &'a TierProfile) -> &'a TierProfile {
        match self.served_tier.and_then(|name| self.tiers.profile(name)) {
            Some(served) if served.name != selected.name => {
                warn!(
                    key = %job.key(),
                    size = job.size_bytes(),
                    selected = %selected.name,
                    served = %served.name,
                    "Job misrouted to another tier's worker"
                );
                served
            }
            Some(served) => served,
            None => selected,
        }
    }

    async fn fetch_source(&self, job: &Job) -> Result<Arc<SourceImage>> {
        let head = self.store.head_object(job.location()).await?;
        if head.content_length != job.size_bytes() {
            let actual = self.tiers.select(head.content_length)?;
            warn!(
                key = %job.key(),
                notified = job.size_bytes(),
                actual = head.content_length,
                actual_tier = %actual.name,
                "Notification size differs from stored object"
            );
        }

        probe(self.store.as_ref(), job.location()).await
    }

    async fn render_before_deadline(
        &self,
        job: &Job,
        source: &Arc<SourceImage>,
        spec: VariantSpec,
        config: &VariantConfig,
        deadline: Instant,
    ) -> VariantResult {
        let render = self.renderer.render(job.location(), source, spec, config);
        match tokio::time::timeout_at(deadline, render).await {
            Ok(result) => result,
            Err(_) => {
                let key = output_key(job.key(), spec.target_width, spec.output_format);
                warn!(output_key = %key, "Variant cancelled at job deadline");
                VariantResult::failure(
                    spec,
                    key,
                    VariantError::Cancelled("job deadline exceeded".to_string()).to_string(),
                )
            }
        }
    }
}

fn transition(state: &mut JobState, next: JobState, job: &Job) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid job transition {state:?} -> {next:?}"
    );
    debug!(key = %job.key(), from = state.as_str(), to = next.as_str(), "Job state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StorageLocation;
    use crate::services::variants::encoder::ImageCrateEncoder;
    use crate::storage::InMemoryObjectStore;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::time::Duration;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 10])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn service(store: Arc<InMemoryObjectStore>, tiers: TierPolicy) -> VariantService {
        VariantService::new(
            store,
            Arc::new(ImageCrateEncoder),
            tiers,
            VariantConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_size_out_of_range_never_fetches() {
        let store = Arc::new(InMemoryObjectStore::new());
        let svc = service(store.clone(), TierPolicy::default());
        let payload = br#"{"bucket":"media","key":"big.jpg","size":26214401}"#;

        let err = svc.process_notification(payload, None).await.unwrap_err();
        assert!(matches!(err, JobError::SizeOutOfRange { .. }));
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test]
    async fn test_stored_size_is_revalidated() {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut profiles = TierPolicy::default().profiles().to_vec();
        profiles[0].max_bytes = 10;
        profiles[1].min_bytes = 10;
        profiles[1].max_bytes = 20;
        profiles[2].min_bytes = 20;
        profiles[2].max_bytes = 30;
        let svc = service(store.clone(), TierPolicy::new(profiles).unwrap());

        let location = StorageLocation::new("media", "a.png");
        store.insert(location, png(8, 8), "image/png");
        let payload = br#"{"bucket":"media","key":"a.png","size":5}"#;

        let err = svc.process_notification(payload, None).await.unwrap_err();
        assert!(matches!(err, JobError::SizeOutOfRange { .. }));
        assert_eq!(store.get_count(), 0);
    }

    /// Delays every head request, to push a job past its deadline
    struct SlowHeadStore {
        inner: Arc<InMemoryObjectStore>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ObjectStore for SlowHeadStore {
        async fn head_object(
            &self,
            location: &StorageLocation,
        ) -> std::result::Result<crate::storage::ObjectHead, crate::error::StorageError> {
            tokio::time::sleep(self.delay).await;
            self.inner.head_object(location).await
        }

        async fn get_object(
            &self,
            location: &StorageLocation,
        ) -> std::result::Result<bytes::Bytes, crate::error::StorageError> {
            self.inner.get_object(location).await
        }

        async fn put_object(
            &self,
            location: &StorageLocation,
            body: bytes::Bytes,
            options: crate::storage::PutOptions,
        ) -> std::result::Result<(), crate::error::StorageError> {
            self.inner.put_object(location, body, options).await
        }
    }

    #[tokio::test]
    async fn test_deadline_before_rendering_is_timeout() {
        let inner = Arc::new(InMemoryObjectStore::new());
        let mut profiles = TierPolicy::default().profiles().to_vec();
        for profile in &mut profiles {
            profile.timeout_budget = Duration::from_millis(20);
        }
        let store = Arc::new(SlowHeadStore {
            inner: inner.clone(),
            delay: Duration::from_millis(500),
        });
        let svc = VariantService::new(
            store,
            Arc::new(ImageCrateEncoder),
            TierPolicy::new(profiles).unwrap(),
            VariantConfig::default(),
        );
        let bytes = png(64, 64);
        let payload = format!(
            r#"{{"bucket":"media","key":"a.png","size":{}}}"#,
            bytes.len()
        );
        inner.insert(StorageLocation::new("media", "a.png"), bytes, "image/png");

        let err = svc
            .process_notification(payload.as_bytes(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Timeout");
        assert!(err.is_transient());
        assert_eq!(inner.get_count(), 0);
        assert_eq!(inner.put_count(), 0);
    }

    #[tokio::test]
    async fn test_served_tier_budget_is_used() {
        let store = Arc::new(InMemoryObjectStore::new());
        let svc = service(store.clone(), TierPolicy::default())
            .with_served_tier(Some(TierName::Tier3));
        let bytes = png(40, 20);
        let payload = format!(
            r#"{{"bucket":"media","key":"small.png","size":{}}}"#,
            bytes.len()
        );
        store.insert(StorageLocation::new("media", "small.png"), bytes, "image/png");

        let result = svc
            .process_notification(payload.as_bytes(), None)
            .await
            .unwrap();
        assert_eq!(result.tier, TierName::Tier3);
        assert_eq!(result.status, JobStatus::Completed);
    }

    /// Encodes frames up to `fast_width` immediately and stalls on anything wider
    struct StallingEncoder {
        fast_width: u32,
        stall: Duration,
    }

    impl VariantEncoder for StallingEncoder {
        fn encode(
            &self,
            image: &DynamicImage,
            codec: crate::models::ImageCodec,
            quality: u8,
        ) -> std::result::Result<Vec<u8>, VariantError> {
            if image.width() > self.fast_width {
                std::thread::sleep(self.stall);
            }
            ImageCrateEncoder.encode(image, codec, quality)
        }
    }

    #[tokio::test]
    async fn test_deadline_during_rendering_cancels_remaining_variants() {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut profiles = TierPolicy::default().profiles().to_vec();
        for profile in &mut profiles {
            profile.timeout_budget = Duration::from_secs(1);
        }
        let config = VariantConfig {
            target_widths: vec![100, 200],
            ..VariantConfig::default()
        };
        let svc = VariantService::new(
            store.clone(),
            Arc::new(StallingEncoder {
                fast_width: 100,
                stall: Duration::from_secs(2),
            }),
            TierPolicy::new(profiles).unwrap(),
            config,
        );
        let bytes = png(400, 200);
        let payload = format!(
            r#"{{"bucket":"media","key":"p.png","size":{}}}"#,
            bytes.len()
        );
        store.insert(StorageLocation::new("media", "p.png"), bytes, "image/png");

        let result = svc
            .process_notification(payload.as_bytes(), None)
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Degraded);
        assert_eq!((result.succeeded, result.failed), (2, 4));
        assert_eq!(result.variants.len(), 6);

        let (done, cancelled) = result.variants.split_at(2);
        assert!(done.iter().all(|v| v.succeeded));
        for variant in cancelled {
            assert!(!variant.succeeded, "{}", variant.output_key);
            assert_eq!(
                variant.error_message.as_deref(),
                Some("Cancelled: job deadline exceeded")
            );
        }
        assert_eq!(
            cancelled
                .iter()
                .map(|v| v.output_key.as_str())
                .collect::<Vec<_>>(),
            vec!["p-200w.webp", "p-200w.png", "p.webp", "p.png"]
        );

        // cancelled renders never reach the store; p.png is the untouched source
        assert_eq!(
            store.keys("media"),
            vec!["p-100w.png", "p-100w.webp", "p.png"]
        );
        assert_eq!(store.put_count(), 2);
    }
}
