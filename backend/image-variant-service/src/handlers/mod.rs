/// HTTP handlers for the variant service
///
/// - Jobs: push endpoint receiving upload notifications
/// - Health: liveness, readiness and tier routing table
pub mod health;
pub mod jobs;

pub use health::{health_check, liveness_check, readiness_check};
pub use jobs::{submit_job, ROUTING_SIZE_HEADER};

use actix_web::web;

/// Register every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .route("/jobs", web::post().to(submit_job))
                .route("/health", web::get().to(health_check))
                .route("/health/ready", web::get().to(readiness_check))
                .route("/health/live", web::get().to(liveness_check)),
        );
}
