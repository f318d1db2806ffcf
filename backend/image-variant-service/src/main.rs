//! Image Variant Service - HTTP Server
//!
//! Receives upload notifications on `POST /api/v1/jobs` and writes resized variants next
//! to the original object.
//!
//! Environment variables: see `config.rs`. `LOG_FORMAT=json` switches to JSON logs.

use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use image_variant_service::handlers;
use image_variant_service::services::variants::ImageCrateEncoder;
use image_variant_service::services::VariantService;
use image_variant_service::storage::S3ObjectStore;
use image_variant_service::Config;
use std::io;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("image_variant_service=info,actix_web=info"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid configuration: {e}"),
        )
    })?;

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    info!(
        env = %config.app.env,
        region = %config.s3.region,
        served_tier = ?config.worker.served_tier,
        quality = config.variants.quality,
        target_widths = ?config.variants.target_widths,
        "Configuration loaded"
    );
    for (tier, filter) in config.tiers.routing_filters() {
        info!(tier = %tier, filter = %filter, "Tier route");
    }

    let store = Arc::new(S3ObjectStore::from_config(&config.s3).await);
    let service = web::Data::new(
        VariantService::new(
            store,
            Arc::new(ImageCrateEncoder),
            config.tiers.clone(),
            config.variants.clone(),
        )
        .with_served_tier(config.worker.served_tier),
    );

    info!(address = %bind_address, "Image variant service starting");

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::PayloadConfig::new(64 * 1024))
            .wrap(actix_middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
