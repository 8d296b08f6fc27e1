use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use crate::app::remote::BlobStorage;
use crate::config::{AppConfig, StorageConfig};
use crate::error::{BackendError, ErrorCode};

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    base_url: Url,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let storage = config
            .storage
            .as_ref()
            .ok_or_else(|| anyhow!("object storage is disabled"))?;
        Self::from_storage_config(storage).await
    }

    async fn from_storage_config(config: &StorageConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(s3_builder.build());

        let public_endpoint = config
            .s3_public_endpoint
            .as_deref()
            .unwrap_or(&config.s3_endpoint);

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            base_url: parse_endpoint(public_endpoint)?,
        })
    }

    pub fn object_url(&self, key: &str) -> Result<String> {
        object_url(&self.base_url, &self.bucket, key)
    }
}

#[async_trait]
impl BlobStorage for ObjectStorage {
    async fn upload(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String, BackendError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(map_s3_error)?;

        self.object_url(key)
            .map_err(|err| BackendError::internal(err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(map_s3_error)?;
        Ok(())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = if endpoint.contains("://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };
    Ok(url)
}

fn object_url(base: &Url, bucket: &str, key: &str) -> Result<String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("storage endpoint cannot be a base url: {}", base))?
        .pop_if_empty()
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.to_string())
}

fn map_s3_error<E, R>(err: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    let code = match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ErrorCode::Unavailable,
        _ => s3_code(err.code()),
    };
    BackendError::new(code, message)
}

fn s3_code(code: Option<&str>) -> ErrorCode {
    match code {
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "Forbidden") => {
            ErrorCode::StorageUnauthorized
        }
        Some("QuotaExceeded" | "EntityTooLarge") => ErrorCode::StorageQuotaExceeded,
        Some("NoSuchKey" | "NotFound" | "NoSuchBucket") => ErrorCode::NotFound,
        _ => ErrorCode::Internal,
    }
}
