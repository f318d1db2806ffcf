/// Job handlers - push endpoint for upload notifications
use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::{JobError, Result};
use crate::services::VariantService;

/// Header carrying the dispatch layer's numeric routing attribute
pub const ROUTING_SIZE_HEADER: &str = "x-routing-size";

/// Process one notification
///
/// Replies 200 with the job result, including degraded jobs. Fatal errors are rendered
/// by `JobError`'s `ResponseError` impl with `retryable` set for transient kinds.
pub async fn submit_job(
    service: web::Data<VariantService>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let routing_size = routing_size(&req)?;
    let result = service.process_notification(&body, routing_size).await?;
    Ok(HttpResponse::Ok().json(result))
}

fn routing_size(req: &HttpRequest) -> Result<Option<u64>> {
    let Some(value) = req.headers().get(ROUTING_SIZE_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| {
            JobError::MalformedJob(format!("{ROUTING_SIZE_HEADER} must be a non-negative integer"))
        })
}
