/// Error types for the image variant service
///
/// Two tiers of failure: `JobError` aborts a whole job and is surfaced to the invoking
/// collaborator, `VariantError` is caught at a single variant's boundary and recorded in
/// the job result.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for job-level operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Fatal, job-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Notification is missing required fields or is not parseable
    #[error("Malformed job: {0}")]
    MalformedJob(String),

    /// Object key does not carry an accepted image extension
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Source size is above the largest tier
    #[error("Size {size} bytes is out of range (max {max} bytes)")]
    SizeOutOfRange { size: u64, max: u64 },

    /// Object store unreachable or object missing
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Bytes are not a decodable image
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Job deadline expired before rendering could start
    #[error("Job timed out after {0}s")]
    Timeout(u64),
}

impl JobError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::MalformedJob(_) => "MalformedJob",
            JobError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            JobError::SizeOutOfRange { .. } => "SizeOutOfRange",
            JobError::Fetch(_) => "FetchError",
            JobError::Decode(_) => "DecodeError",
            JobError::Timeout(_) => "Timeout",
        }
    }

    /// Whether redelivering the same notification could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Fetch(_) | JobError::Timeout(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind().to_string(),
            message: self.to_string(),
            retryable: self.is_transient(),
        }
    }
}

/// Per-variant errors, never fatal to the job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    /// The planner's no-upscale invariant was violated
    #[error("Refusing to upscale: target width {target} >= source width {source_width}")]
    Upscale { target: u32, source_width: u32 },

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl From<image::ImageError> for VariantError {
    fn from(err: image::ImageError) -> Self {
        VariantError::Encode(err.to_string())
    }
}

/// Errors returned by the object store contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Object store rejected request: {0}")]
    Rejected(String),
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        JobError::Fetch(err.to_string())
    }
}

impl From<StorageError> for VariantError {
    fn from(err: StorageError) -> Self {
        VariantError::Upload(err.to_string())
    }
}

/// Startup configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid quality {0}: must be within 1..=100")]
    Quality(u8),

    #[error("Invalid target widths: {0}")]
    TargetWidths(String),

    #[error("At least one output format is required")]
    NoOutputFormats,

    #[error("Render concurrency must be at least 1")]
    RenderConcurrency,

    #[error("Invalid tier table: {0}")]
    Tiers(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Structured fatal error sent back to the invoking collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl ResponseError for JobError {
    fn status_code(&self) -> StatusCode {
        match self {
            JobError::MalformedJob(_) | JobError::UnsupportedMediaType(_) => {
                StatusCode::BAD_REQUEST
            }
            JobError::SizeOutOfRange { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            JobError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            JobError::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            JobError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_response())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::MalformedJob(err.to_string())
    }
}
