//! src/services/upload_service.rs
//!
//! UploadService runs the upload pipeline for one file or a batch:
//! decode → validate → generate key → `BlobStore::put`.
//!
//! Batches run every item as its own task. Items never affect one another: a
//! rejected or failed item only fills its own result slot. Persistence is
//! bounded by `max_concurrency`, and the batch returns only once every task has
//! settled. Results are written by input index, so completion order never
//! leaks into the output.

use crate::{
    errors::UploadError,
    models::upload::{BatchResult, StoredImage, UploadRequest, UploadResult},
    services::{
        blob_store::BlobStore,
        keys::KeyGenerator,
        validator::{self, DEFAULT_MAX_FILE_SIZE},
    },
};
use chrono::Utc;
use std::{sync::Arc, time::Instant};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Limits applied to every upload.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Leading key segment, e.g. `user-logos`.
    pub namespace: String,
    pub max_file_size: usize,
    /// Maximum in-flight items per batch.
    pub max_concurrency: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            namespace: "user-logos".into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_concurrency: 4,
        }
    }
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn BlobStore>,
    keys: Arc<KeyGenerator>,
    policy: Arc<UploadPolicy>,
}

impl UploadService {
    pub fn new(store: Arc<dyn BlobStore>, keys: KeyGenerator, policy: UploadPolicy) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
            policy: Arc::new(policy),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Run a single request through the full pipeline.
    ///
    /// Cancellation is checked before the store is contacted and raced
    /// against the in-flight put.
    pub async fn upload_one(
        &self,
        request: UploadRequest,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let UploadRequest {
            payload,
            filename,
            application_id,
        } = request;

        let bytes = payload.decode().inspect_err(|err| {
            warn!(filename = %filename, app = %application_id, "rejected upload: {}", err);
        })?;

        let format = validator::validate(&bytes, self.policy.max_file_size)
            .into_result()
            .inspect_err(|reason| {
                warn!(
                    filename = %filename,
                    app = %application_id,
                    size_bytes = bytes.len(),
                    "rejected upload: {}",
                    reason
                );
            })?;

        let key = self.keys.generate(
            &self.policy.namespace,
            &application_id,
            &filename,
            Utc::now(),
        );

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let url = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(key = %key, "upload cancelled while in flight");
                return Err(UploadError::Cancelled);
            }
            put = self.store.put(key.as_str(), bytes, format.content_type()) => {
                put.inspect_err(|err| error!(key = %key, "store rejected upload: {}", err))?
            }
        };

        Ok(StoredImage { key, url, format })
    }

    /// Process a batch, returning one result per request in input order.
    ///
    /// An empty batch yields an empty result. If `cancel` fires, items that
    /// have not reached the store resolve to `UploadError::Cancelled`; the
    /// call still waits for every task before returning.
    pub async fn process(
        &self,
        requests: Vec<UploadRequest>,
        cancel: CancellationToken,
    ) -> BatchResult {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        let start = Instant::now();
        let permits = Arc::new(Semaphore::new(self.policy.max_concurrency.max(1)));
        let mut slots: Vec<Option<UploadResult>> = (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let service = self.clone();
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => service.upload_one(request, &cancel).await,
                    Err(_) => Err(UploadError::Aborted),
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => error!("upload task failed: {}", err),
            }
        }

        // A slot is only empty if its task panicked.
        let results: BatchResult = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(UploadError::Aborted)))
            .collect();

        let stored = results.iter().filter(|r| r.is_ok()).count();
        info!(
            total,
            stored,
            failed = total - stored,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "batch upload settled"
        );

        results
    }
}
