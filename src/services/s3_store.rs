//! S3BlobStore: objects written to an S3-compatible bucket.

use crate::services::blob_store::{BlobStore, BlobStoreError, BlobStoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    aws::{AmazonS3, AmazonS3Builder},
    path::Path,
};
use std::{fmt, time::Instant};
use uuid::Uuid;

/// Static access keys for the bucket. When absent, the client falls back to
/// the instance credential provider.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct S3BlobStore {
    store: AmazonS3,
    bucket: String,
    region: String,
    // Custom endpoint for S3-compatible providers (MinIO, Spaces, ...)
    endpoint_url: Option<String>,
}

impl S3BlobStore {
    /// Build a client for `bucket`. Other `AWS_*` settings (session token,
    /// virtual-hosted style) are still read from the environment.
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        credentials: Option<S3Credentials>,
    ) -> BlobStoreResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(creds) = credentials {
            builder = builder
                .with_access_key_id(creds.access_key_id)
                .with_secret_access_key(creds.secret_access_key);
        }

        if let Some(ref endpoint) = endpoint_url {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| BlobStoreError::Configuration(e.to_string()))?;

        Ok(Self {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    fn object_url(&self, key: &str) -> String {
        object_url(&self.bucket, &self.region, self.endpoint_url.as_deref(), key)
    }
}

/// Public URL of `key`: path-style under a custom endpoint, virtual-hosted
/// style on AWS.
fn object_url(bucket: &str, region: &str, endpoint_url: Option<&str>, key: &str) -> String {
    match endpoint_url {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobStoreResult<String> {
        let location = Path::from(key);
        let size = bytes.len();
        let start = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(bytes), opts)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                BlobStoreError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.object_url(key))
    }

    /// Put and delete a marker object, so bad credentials or a missing
    /// bucket surface on `/readyz` instead of on the first upload.
    async fn probe(&self) -> BlobStoreResult<()> {
        let location = Path::from(format!("readyz/{}", Uuid::new_v4()));
        self.store
            .put(&location, PutPayload::from(Bytes::from_static(b"readyz")))
            .await
            .map_err(|e| BlobStoreError::UploadFailed(e.to_string()))?;
        if let Err(e) = self.store.delete(&location).await {
            tracing::warn!(bucket = %self.bucket, key = %location, "could not remove probe object: {}", e);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}
