//! DiskBlobStore: objects written beneath a local directory.
//!
//! Each object lands at `base_path/{key}` and is published under
//! `public_base_url/{key}`. Writes go to a temp file in the same
//! directory, are fsynced, then renamed into place so readers never observe a
//! partial object.
//!
//! The write runs as one blocking job. Dropping the `put` future (cancellation,
//! request deadline) does not interrupt it: the job either renames the object
//! into place or removes its temp file.

use crate::services::blob_store::{BlobStore, BlobStoreError, BlobStoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use md5::Context;
use std::{
    fs::{self as std_fs, File},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use tokio::{fs, task};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct DiskBlobStore {
    /// Root directory for object payloads.
    base_path: PathBuf,

    /// URL prefix under which `base_path` is published.
    public_base_url: String,
}

impl DiskBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Reject keys that could escape `base_path` or collide with the store's
    /// own dot-prefixed temp and probe files.
    ///
    /// Keys from `KeyGenerator` always pass; this guards against other callers.
    fn ensure_key_safe(key: &str) -> BlobStoreResult<()> {
        let invalid = || BlobStoreError::InvalidKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(invalid());
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(invalid());
        }
        if key.split('/').any(|segment| segment.starts_with('.')) {
            return Err(invalid());
        }
        Ok(())
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.split('/').filter(|segment| !segment.is_empty()));
        path
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    /// Write `bytes` to `path` via a sibling temp file and atomic rename.
    /// Returns the hex MD5 of the payload. Blocking; run it off the runtime.
    fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<String> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "object path missing parent directory"))?;
        std_fs::create_dir_all(parent)?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = (|| {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std_fs::rename(&tmp_path, path)
        })();

        if let Err(err) = result {
            let _ = std_fs::remove_file(&tmp_path);
            return Err(err);
        }

        let mut digest = Context::new();
        digest.consume(bytes);
        Ok(format!("{:x}", digest.compute()))
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobStoreResult<String> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);
        let start = Instant::now();
        let size = bytes.len();

        let target = path.clone();
        let etag = task::spawn_blocking(move || Self::write_atomically(&target, &bytes))
            .await
            .map_err(|err| BlobStoreError::UploadFailed(format!("write task failed: {}", err)))?
            .map_err(|err| {
                BlobStoreError::UploadFailed(format!("writing {}: {}", path.display(), err))
            })?;

        info!(
            key = %key,
            path = %path.display(),
            content_type = %content_type,
            size_bytes = size,
            etag = %etag,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Disk upload successful"
        );

        Ok(self.object_url(key))
    }

    /// Write, read back and delete a small marker file under `base_path`.
    async fn probe(&self) -> BlobStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        if let Err(err) = fs::remove_file(&tmp_path).await {
            debug!("could not remove probe file {}: {}", tmp_path.display(), err);
        }
        if read_back? != b"readyz" {
            return Err(BlobStoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
