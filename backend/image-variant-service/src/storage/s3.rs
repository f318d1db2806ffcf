/// S3 adapter for the object store contract
///
/// Works against AWS S3 or any S3-compatible endpoint (MinIO, etc.).
use super::{ObjectHead, ObjectStore, PutOptions};
use crate::config::S3Config;
use crate::error::StorageError;
use crate::models::StorageLocation;
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

/// Object store backed by the AWS SDK S3 client
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Initialize the S3 client from configuration
    ///
    /// Static credentials are used when both keys are configured, otherwise the default
    /// credential chain applies.
    pub async fn from_config(config: &S3Config) -> Self {
        use aws_sdk_s3::config::Region;

        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            use aws_sdk_s3::config::Credentials;

            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "image_variant_service_s3",
            );
            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::new(Client::from_conf(s3_config))
    }
}

fn classify<E, R>(err: SdkError<E, R>, not_found: bool, location: &StorageLocation) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if not_found {
        return StorageError::NotFound(location.to_string());
    }
    let message = format!("{location}: {}", DisplayErrorContext(&err));
    match err {
        SdkError::ServiceError(_) => StorageError::Rejected(message),
        _ => StorageError::Unavailable(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, location: &StorageLocation) -> Result<ObjectHead, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false);
                classify(e, not_found, location)
            })?;

        Ok(ObjectHead {
            content_length: output.content_length().unwrap_or(0).max(0) as u64,
            content_type: output.content_type().map(str::to_string),
        })
    }

    async fn get_object(&self, location: &StorageLocation) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                classify(e, not_found, location)
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("{location}: failed to read body: {e}"))
            })?
            .into_bytes();

        debug!(location = %location, size = bytes.len(), "Downloaded from S3");
        Ok(bytes)
    }

    async fn put_object(
        &self,
        location: &StorageLocation,
        body: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(options.content_type)
            .cache_control(options.cache_control)
            .set_metadata(Some(options.metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(e, false, location))?;

        debug!(location = %location, size, "Uploaded to S3");
        Ok(())
    }
}
