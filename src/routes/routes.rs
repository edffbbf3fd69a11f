//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - **Upload endpoints** (behind the Basic auth gate)
//!   - `POST /api/file-managements/upload` — store one image
//!   - `POST /api/file-managements/upload-multiple` — store a batch of images
//!
//! - **Operational endpoints**
//!   - `GET /healthz`, `GET /readyz`
//!   - `GET /` — always 403

use crate::{
    auth::{BasicAuthGate, require_basic_auth},
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{upload_multiple, upload_single},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{get, post},
};

/// Build the router. Request bodies larger than `max_body_bytes` are refused
/// before any handler runs.
pub fn routes(gate: BasicAuthGate, max_body_bytes: usize) -> Router<AppState> {
    let uploads = Router::new()
        .route("/upload", post(upload_single))
        .route("/upload-multiple", post(upload_multiple))
        .route_layer(middleware::from_fn_with_state(gate, require_basic_auth));

    Router::new()
        .route("/", get(|| async { (StatusCode::FORBIDDEN, "Forbidden") }))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/file-managements", uploads)
        .layer(DefaultBodyLimit::max(max_body_bytes))
}
