use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "image_variant_jobs_total",
        "Jobs processed, by outcome",
        &["outcome"]
    )
    .expect("failed to register image_variant_jobs_total")
});

static JOB_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "image_variant_job_failures_total",
        "Fatal job errors, by kind",
        &["kind"]
    )
    .expect("failed to register image_variant_job_failures_total")
});

static VARIANTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "image_variant_variants_total",
        "Rendered variants, by output format and outcome",
        &["format", "outcome"]
    )
    .expect("failed to register image_variant_variants_total")
});

static JOB_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "image_variant_job_duration_seconds",
        "Wall time of jobs that reached rendering",
        &["tier"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("failed to register image_variant_job_duration_seconds")
});

pub fn record_job_completed(tier: &str, degraded: bool, elapsed: Duration) {
    let outcome = if degraded { "degraded" } else { "completed" };
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[tier])
        .observe(elapsed.as_secs_f64());
}

pub fn record_job_failed(kind: &str) {
    JOBS_TOTAL.with_label_values(&["failed"]).inc();
    JOB_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_variant(format: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    VARIANTS_TOTAL.with_label_values(&[format, outcome]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
