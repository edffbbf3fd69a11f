//! Object-store abstraction.
//!
//! The upload pipeline only ever needs to put a blob and learn its public URL.
//! Backends must be safe to call concurrently.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("store misconfigured: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` with the given content type and return the
    /// URL the object can be fetched from.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobStoreResult<String>;

    /// Cheap readiness check used by `/readyz`.
    async fn probe(&self) -> BlobStoreResult<()> {
        Ok(())
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
