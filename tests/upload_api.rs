use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::{
    TestServer,
    multipart::{MultipartForm, Part},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use image_gateway::{
    auth::{BasicAuthGate, Credential},
    routes::routes::routes,
    services::{
        blob_store::{BlobStore, BlobStoreError, BlobStoreResult},
        disk_store::DiskBlobStore,
        keys::KeyGenerator,
        upload_service::{UploadPolicy, UploadService},
    },
    state::AppState,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

const PUBLIC_URL: &str = "http://localhost:3000/objects";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00";
const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF";

struct TestApp {
    server: TestServer,
    dir: TempDir,
}

struct Options {
    gate: BasicAuthGate,
    max_body_bytes: usize,
    request_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            gate: BasicAuthGate::default(),
            max_body_bytes: 1024 * 1024,
            request_timeout: Duration::from_secs(5),
        }
    }
}

fn disk_app(options: Options) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let uploads = UploadService::new(
        Arc::new(DiskBlobStore::new(dir.path(), PUBLIC_URL)),
        KeyGenerator::new(),
        UploadPolicy::default(),
    );
    let state = AppState::new(uploads, 5, options.request_timeout);
    let app = routes(options.gate, options.max_body_bytes).with_state(state);
    TestApp {
        server: TestServer::new(app).unwrap(),
        dir,
    }
}

fn store_app(store: Arc<dyn BlobStore>, request_timeout: Duration) -> TestServer {
    let uploads = UploadService::new(store, KeyGenerator::new(), UploadPolicy::default());
    let state = AppState::new(uploads, 5, request_timeout);
    TestServer::new(routes(BasicAuthGate::default(), 1024 * 1024).with_state(state)).unwrap()
}

/// Store that fails every write, or never finishes one.
struct BrokenStore {
    hang: bool,
}

#[async_trait]
impl BlobStore for BrokenStore {
    async fn put(&self, _key: &str, _bytes: Bytes, _content_type: &str) -> BlobStoreResult<String> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Err(BlobStoreError::UploadFailed("bucket unavailable".into()))
    }

    async fn probe(&self) -> BlobStoreResult<()> {
        Err(BlobStoreError::Configuration("no bucket".into()))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn key_from_url(url: &str) -> &str {
    url.strip_prefix(PUBLIC_URL)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap()
}

#[tokio::test]
async fn single_json_upload_stores_the_file() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(PNG), "filename": "logo.png", "appname": "app1" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let url = body["imageUrl"].as_str().unwrap();
    let key = key_from_url(url);
    assert!(key.starts_with("user-logos/app1/"), "unexpected key {key}");
    assert!(key.ends_with("-logo.png"), "unexpected key {key}");
    assert_eq!(std::fs::read(app.dir.path().join(key)).unwrap(), PNG);
}

#[tokio::test]
async fn data_url_prefix_is_accepted() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({
            "file": format!("data:image/gif;base64,{}", b64(GIF)),
            "filename": "dot.gif",
            "appname": "app1",
        }))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn single_upload_rejects_unknown_types() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(b"%PDF-1.7 not an image"), "filename": "doc.png", "appname": "app1" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "error": "validation error: unsupported or unrecognized file type" }));
    assert_eq!(std::fs::read_dir(app.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn single_upload_rejects_oversized_files() {
    let app = disk_app(Options {
        max_body_bytes: 16 * 1024 * 1024,
        ..Options::default()
    });
    let mut big = GIF.to_vec();
    big.resize(5 * 1024 * 1024 + 1, 0);

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(&big), "filename": "big.gif", "appname": "app1" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "error": "validation error: size limit exceeded" }));
}

#[tokio::test]
async fn single_upload_reports_bad_base64() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": "***", "filename": "a.png", "appname": "app1" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().starts_with("decoding error"));
}

#[tokio::test]
async fn single_upload_requires_every_field() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(PNG), "appname": "app1" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn batch_keeps_submission_order_and_isolates_failures() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .json(&json!({ "base64Files": [
            { "base64": b64(JPEG), "filename": "a.jpg", "appname": "app1" },
            { "base64": b64(b"plain text"), "filename": "b.png", "appname": "app1" },
            { "base64": b64(GIF), "filename": "c.gif", "appname": "app1" },
            { "filename": "d.png", "appname": "app1" },
        ]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let items = body["imageUrls"].as_array().unwrap();
    assert_eq!(items.len(), 4);
    assert!(items[0]["imageUrl"].as_str().unwrap().ends_with("-a.jpg"));
    assert_eq!(items[1], json!({ "error": "validation error: unsupported or unrecognized file type" }));
    assert!(items[2]["imageUrl"].as_str().unwrap().ends_with("-c.gif"));
    assert_eq!(items[3], json!({ "error": "decoding error: missing base64 payload" }));

    for item in [&items[0], &items[2]] {
        let key = key_from_url(item["imageUrl"].as_str().unwrap());
        assert!(app.dir.path().join(key).is_file());
    }
}

#[tokio::test]
async fn batch_with_duplicate_names_stores_both() {
    let app = disk_app(Options::default());

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .json(&json!({ "base64Files": [
            { "base64": b64(PNG), "filename": "same.png", "appname": "app1" },
            { "base64": b64(PNG), "filename": "same.png", "appname": "app1" },
        ]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let first = body["imageUrls"][0]["imageUrl"].as_str().unwrap();
    let second = body["imageUrls"][1]["imageUrl"].as_str().unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn empty_or_missing_batch_is_rejected() {
    let app = disk_app(Options::default());

    for body in [json!({ "base64Files": [] }), json!({})] {
        let response = app
            .server
            .post("/api/file-managements/upload-multiple")
            .json(&body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "No files uploaded" }));
    }
}

#[tokio::test]
async fn json_batch_larger_than_concurrency_bound_is_processed() {
    let app = disk_app(Options::default());
    let items: Vec<Value> = (0..12)
        .map(|i| json!({ "base64": b64(GIF), "filename": format!("{i}.gif"), "appname": "app1" }))
        .collect();

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .json(&json!({ "base64Files": items }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let urls = body["imageUrls"].as_array().unwrap();
    assert_eq!(urls.len(), 12);
    for (i, item) in urls.iter().enumerate() {
        let url = item["imageUrl"].as_str().unwrap();
        assert!(url.ends_with(&format!("-{i}.gif")), "item {i} out of order: {url}");
    }
}

#[tokio::test]
async fn multipart_batch_over_the_file_cap_is_rejected() {
    let app = disk_app(Options::default());
    let form = (0..6).fold(MultipartForm::new().add_text("appname", "app1"), |form, i| {
        form.add_part("files", Part::bytes(GIF.to_vec()).file_name(format!("{i}.gif")))
    });

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .multipart(form)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "error": "Too many files: at most 5 per request" }));
    assert_eq!(std::fs::read_dir(app.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn multipart_single_upload() {
    let app = disk_app(Options::default());
    let form = MultipartForm::new()
        .add_text("appname", "app1")
        .add_part("file", Part::bytes(GIF.to_vec()).file_name("pixel.gif"));

    let response = app
        .server
        .post("/api/file-managements/upload")
        .multipart(form)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["imageUrl"].as_str().unwrap().ends_with("-pixel.gif"));
}

#[tokio::test]
async fn multipart_batch_upload() {
    let app = disk_app(Options::default());
    let form = MultipartForm::new()
        .add_text("appname", "app1")
        .add_part("files", Part::bytes(PNG.to_vec()).file_name("a.png"))
        .add_part("files", Part::bytes(b"nope".to_vec()).file_name("b.png"));

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .multipart(form)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["imageUrls"][0]["imageUrl"].as_str().unwrap().ends_with("-a.png"));
    assert_eq!(
        body["imageUrls"][1],
        json!({ "error": "validation error: unsupported or unrecognized file type" })
    );
}

#[tokio::test]
async fn multipart_batch_requires_appname() {
    let app = disk_app(Options::default());
    let form =
        MultipartForm::new().add_part("files", Part::bytes(PNG.to_vec()).file_name("a.png"));

    let response = app
        .server
        .post("/api/file-managements/upload-multiple")
        .multipart(form)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bodies_over_the_limit_are_refused() {
    let app = disk_app(Options {
        max_body_bytes: 1024,
        ..Options::default()
    });

    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(&[0u8; 4096]), "filename": "a.png", "appname": "app1" }))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn auth_gate_guards_upload_routes_only() {
    let app = disk_app(Options {
        gate: BasicAuthGate::new(vec![Credential::new("svc", "s3cret")]),
        ..Options::default()
    });
    let body = json!({ "file": b64(PNG), "filename": "logo.png", "appname": "app1" });

    let denied = app
        .server
        .post("/api/file-managements/upload")
        .json(&body)
        .await;
    denied.assert_status(StatusCode::UNAUTHORIZED);
    denied.assert_json(&json!({ "message": "Authentication failed" }));

    let wrong = app
        .server
        .post("/api/file-managements/upload")
        .add_header("Authorization", format!("Basic {}", STANDARD.encode("svc:nope")))
        .json(&body)
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let allowed = app
        .server
        .post("/api/file-managements/upload")
        .add_header("Authorization", format!("Basic {}", STANDARD.encode("svc:s3cret")))
        .json(&body)
        .await;
    allowed.assert_status_ok();

    app.server.get("/healthz").await.assert_status_ok();
}

#[tokio::test]
async fn root_is_forbidden() {
    let app = disk_app(Options::default());
    let response = app.server.get("/").await;
    response.assert_status(StatusCode::FORBIDDEN);
    response.assert_text("Forbidden");
}

#[tokio::test]
async fn health_and_readiness() {
    let app = disk_app(Options::default());

    app.server.get("/healthz").await.assert_json(&json!({ "status": "ok" }));

    let ready = app.server.get("/readyz").await;
    ready.assert_status_ok();
    let body: Value = ready.json();
    assert_eq!(body["checks"]["local"]["ok"], json!(true));

    let broken = store_app(Arc::new(BrokenStore { hang: false }), Duration::from_secs(5));
    let ready = broken.get("/readyz").await;
    ready.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = ready.json();
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["checks"]["broken"]["ok"], json!(false));
}

#[tokio::test]
async fn stored_objects_are_not_served_back() {
    let app = disk_app(Options::default());
    let response = app
        .server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(PNG), "filename": "logo.png", "appname": "app1" }))
        .await;
    let body: Value = response.json();
    let key = key_from_url(body["imageUrl"].as_str().unwrap()).to_string();

    app.server
        .get(&format!("/objects/{key}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn storage_failures_surface_per_request_and_per_item() {
    let server = store_app(Arc::new(BrokenStore { hang: false }), Duration::from_secs(5));

    let single = server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(PNG), "filename": "a.png", "appname": "app1" }))
        .await;
    single.assert_status(StatusCode::BAD_GATEWAY);
    single.assert_json(&json!({ "error": "storage error: upload failed: bucket unavailable" }));

    let batch = server
        .post("/api/file-managements/upload-multiple")
        .json(&json!({ "base64Files": [
            { "base64": b64(PNG), "filename": "a.png", "appname": "app1" },
            { "base64": b64(b"text"), "filename": "b.png", "appname": "app1" },
        ]}))
        .await;
    batch.assert_status_ok();
    batch.assert_json(&json!({ "imageUrls": [
        { "error": "storage error: upload failed: bucket unavailable" },
        { "error": "validation error: unsupported or unrecognized file type" },
    ]}));
}

#[tokio::test]
async fn slow_store_is_cancelled_at_the_deadline() {
    let server = store_app(Arc::new(BrokenStore { hang: true }), Duration::from_millis(50));

    let single = server
        .post("/api/file-managements/upload")
        .json(&json!({ "file": b64(PNG), "filename": "a.png", "appname": "app1" }))
        .await;
    single.assert_status(StatusCode::GATEWAY_TIMEOUT);

    let batch = server
        .post("/api/file-managements/upload-multiple")
        .json(&json!({ "base64Files": [
            { "base64": b64(PNG), "filename": "a.png", "appname": "app1" },
            { "base64": b64(b"text"), "filename": "b.png", "appname": "app1" },
        ]}))
        .await;
    batch.assert_status_ok();
    batch.assert_json(&json!({ "imageUrls": [
        { "error": "upload cancelled before completion" },
        { "error": "validation error: unsupported or unrecognized file type" },
    ]}));
}
