//! HTTP handlers for single and batch image uploads.
//! Bodies arrive as JSON (base64 payloads) or multipart (raw parts); both are
//! turned into `UploadRequest`s and handed to `UploadService`.

use crate::{
    errors::AppError,
    models::upload::{UploadRequest, UploadResult},
    state::AppState,
};
use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State, multipart::MultipartError},
    http::header,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// JSON body for `POST /upload`.
#[derive(Debug, Deserialize)]
pub struct SingleUploadBody {
    pub file: Option<String>,
    pub filename: Option<String>,
    pub appname: Option<String>,
}

/// JSON body for `POST /upload-multiple`.
///
/// Items stay untyped here so one malformed entry becomes a per-item error
/// instead of rejecting the whole request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadBody {
    pub base64_files: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct BatchItemBody {
    base64: Option<String>,
    filename: Option<String>,
    appname: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleUploadResponse {
    pub image_url: String,
}

/// One entry of a batch response: `{ "imageUrl" }` or `{ "error" }`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ItemResponse {
    Uploaded {
        #[serde(rename = "imageUrl")]
        image_url: String,
    },
    Failed {
        error: String,
    },
}

impl From<UploadResult> for ItemResponse {
    fn from(result: UploadResult) -> Self {
        match result {
            Ok(stored) => ItemResponse::Uploaded {
                image_url: stored.url,
            },
            Err(err) => ItemResponse::Failed {
                error: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    pub image_urls: Vec<ItemResponse>,
}

/// `POST /upload` — store one image.
pub async fn upload_single(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SingleUploadResponse>, AppError> {
    let upload = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        single_from_multipart(multipart).await?
    } else {
        let Json(body) = Json::<SingleUploadBody>::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        single_from_json(body)?
    };

    let cancel = CancellationToken::new();
    let stored = run_with_deadline(
        state.request_timeout,
        &cancel,
        state.uploads.upload_one(upload, &cancel),
    )
    .await?;

    info!(key = %stored.key, format = ?stored.format, "single upload stored");
    Ok(Json(SingleUploadResponse {
        image_url: stored.url,
    }))
}

/// `POST /upload-multiple` — store a batch of images.
///
/// Always answers 200 with one entry per submitted item, in order, once
/// the request itself is well formed. JSON batches of any length are accepted
/// and throttled by the service's concurrency bound; multipart batches carry
/// at most `max_batch_items` file parts.
pub async fn upload_multiple(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<BatchUploadResponse>, AppError> {
    let requests = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        batch_from_multipart(multipart, state.max_batch_items).await?
    } else {
        let Json(body) = Json::<BatchUploadBody>::from_request(request, &state)
            .await
            .map_err(|e| AppError::new(e.status(), e.body_text()))?;
        batch_from_json(body)
    };

    if requests.is_empty() {
        return Err(AppError::bad_request("No files uploaded"));
    }

    // Cancels spawned uploads if the client goes away mid-batch.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let results = run_with_deadline(
        state.request_timeout,
        &cancel,
        state.uploads.process(requests, cancel.clone()),
    )
    .await;

    Ok(Json(BatchUploadResponse {
        image_urls: results.into_iter().map(ItemResponse::from).collect(),
    }))
}

/// Drive `work` to completion. If `timeout` elapses first, fire `cancel` and
/// keep waiting so the caller still gets every settled outcome.
async fn run_with_deadline<F>(timeout: Duration, cancel: &CancellationToken, work: F) -> F::Output
where
    F: Future,
{
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => output,
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "upload request timed out, cancelling");
            cancel.cancel();
            work.await
        }
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn single_from_json(body: SingleUploadBody) -> Result<UploadRequest, AppError> {
    match (non_empty(body.file), non_empty(body.filename), non_empty(body.appname)) {
        (Some(file), Some(filename), Some(appname)) => {
            Ok(UploadRequest::base64(file, filename, appname))
        }
        _ => Err(AppError::bad_request("No file uploaded")),
    }
}

/// Expects a `file` part plus `appname` and optional `filename` text fields.
/// The part's own file name is used when `filename` is absent.
async fn single_from_multipart(mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    let mut file: Option<Bytes> = None;
    let mut part_filename = None;
    let mut filename = None;
    let mut appname = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                part_filename = field.file_name().map(str::to_string);
                file = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "filename" => filename = Some(field.text().await.map_err(multipart_error)?),
            "appname" => appname = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let filename = non_empty(filename).or_else(|| non_empty(part_filename));
    match (file, filename, non_empty(appname)) {
        (Some(bytes), Some(filename), Some(appname)) => {
            Ok(UploadRequest::bytes(bytes, filename, appname))
        }
        _ => Err(AppError::bad_request("No file uploaded")),
    }
}

fn batch_from_json(body: BatchUploadBody) -> Vec<UploadRequest> {
    body.base64_files
        .unwrap_or_default()
        .into_iter()
        .map(batch_item)
        .collect()
}

fn batch_item(value: serde_json::Value) -> UploadRequest {
    let item: BatchItemBody = match serde_json::from_value(value) {
        Ok(item) => item,
        Err(err) => return UploadRequest::malformed(format!("malformed item: {}", err)),
    };
    let Some(data) = non_empty(item.base64) else {
        return UploadRequest::malformed("missing base64 payload");
    };
    let Some(filename) = non_empty(item.filename) else {
        return UploadRequest::malformed("missing filename");
    };
    let Some(appname) = non_empty(item.appname) else {
        return UploadRequest::malformed("missing appname");
    };
    UploadRequest::base64(data, filename, appname)
}

/// Expects repeated `files` parts and one `appname` field shared by all of them.
/// Refuses the request as soon as more than `max_files` parts arrive.
async fn batch_from_multipart(
    mut multipart: Multipart,
    max_files: usize,
) -> Result<Vec<UploadRequest>, AppError> {
    let mut parts: Vec<(Option<String>, Bytes)> = Vec::new();
    let mut appname = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                if parts.len() == max_files {
                    return Err(AppError::bad_request(format!(
                        "Too many files: at most {} per request",
                        max_files
                    )));
                }
                let part_filename = field.file_name().map(str::to_string);
                parts.push((part_filename, field.bytes().await.map_err(multipart_error)?));
            }
            "appname" => appname = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    if parts.is_empty() {
        return Ok(Vec::new());
    }
    let appname = non_empty(appname).ok_or_else(|| AppError::bad_request("appname is required"))?;

    Ok(parts
        .into_iter()
        .map(|(filename, bytes)| match non_empty(filename) {
            Some(filename) => UploadRequest::bytes(bytes, filename, appname.clone()),
            None => UploadRequest::malformed("missing filename"),
        })
        .collect())
}
