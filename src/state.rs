//! Shared state handed to every handler.

use crate::services::upload_service::UploadService;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    /// Most `files` parts accepted in one multipart batch request.
    pub max_batch_items: usize,
    /// Budget for a whole upload request before in-flight work is cancelled.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(uploads: UploadService, max_batch_items: usize, request_timeout: Duration) -> Self {
        Self {
            uploads,
            max_batch_items,
            request_timeout,
        }
    }
}
