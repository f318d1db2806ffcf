use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::services::VariantService;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct TierRoute {
    tier: &'static str,
    filter: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    max_source_bytes: u64,
    routes: Vec<TierRoute>,
}

/// Basic health check
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check, reporting the tier routing table this worker enforces
pub async fn readiness_check(service: web::Data<VariantService>) -> impl Responder {
    let tiers = service.tiers();
    let routes = tiers
        .routing_filters()
        .into_iter()
        .map(|(tier, filter)| TierRoute {
            tier: tier.as_str(),
            filter,
        })
        .collect();

    HttpResponse::Ok().json(ReadinessResponse {
        ready: true,
        max_source_bytes: tiers.max_bytes(),
        routes,
    })
}

pub async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().finish()
}
