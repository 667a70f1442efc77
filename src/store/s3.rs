//! S3-compatible object store (Cloudflare R2 in production).

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::path::Path;

use super::{ObjectStore, PutReceipt, StoreError, public_url};
use crate::config::StoreCredentials;
use crate::model::ObjectKey;

/// Bucket client plus the public base URL objects are served from.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3Store {
    pub fn new(credentials: &StoreCredentials) -> Self {
        let provider = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            "music-sync",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(StoreCredentials::REGION))
            .endpoint_url(&credentials.endpoint)
            .credentials_provider(provider)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: credentials.bucket.clone(),
            public_base: credentials.public_url.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if let Some(service) = err.as_service_error()
                    && service.is_not_found()
                {
                    return Ok(false);
                }
                // HEAD responses carry no body, so a 404 may not decode as NotFound
                if err.raw_response().map(|r| r.status().as_u16()) == Some(404) {
                    return Ok(false);
                }
                Err(map_sdk_error(err))
            }
        }
    }

    async fn put(
        &self,
        path: &Path,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        let local_error = |message: String| StoreError::LocalFile {
            path: path.display().to_string(),
            message,
        };

        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| local_error(e.to_string()))?
            .len();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| local_error(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(body)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(PutReceipt {
            public_url: self.public_url(key),
            size_bytes,
        })
    }

    fn public_url(&self, key: &ObjectKey) -> String {
        public_url(&self.public_base, key)
    }
}

fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let message = service
                .err()
                .message()
                .or_else(|| service.err().code())
                .unwrap_or("unknown error")
                .to_string();
            StoreError::Service { status, message }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Network(DisplayErrorContext(&err).to_string())
        }
        _ => StoreError::Other(DisplayErrorContext(&err).to_string()),
    }
}
