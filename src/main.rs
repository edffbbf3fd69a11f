use anyhow::{Context, Result};
use axum::Router;
use image_gateway::{
    auth::BasicAuthGate,
    config::{AppConfig, BackendKind},
    routes,
    services::{
        blob_store::BlobStore, disk_store::DiskBlobStore, keys::KeyGenerator,
        s3_store::S3BlobStore, upload_service::UploadService,
    },
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args().context("invalid configuration")?;

    tracing::info!(
        backend = ?cfg.backend,
        namespace = %cfg.namespace,
        max_file_size = cfg.max_file_size,
        max_batch_items = cfg.max_batch_items,
        max_concurrency = cfg.max_concurrency,
        request_timeout_secs = cfg.request_timeout.as_secs(),
        "Starting image-gateway"
    );

    // --- Initialize blob store ---
    let store: Arc<dyn BlobStore> = match cfg.backend {
        BackendKind::Local => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(DiskBlobStore::new(&cfg.storage_dir, &cfg.public_base_url))
        }
        BackendKind::S3 => {
            let s3 = cfg
                .s3
                .clone()
                .context("s3 backend selected without bucket settings")?;
            tracing::info!(
                bucket = %s3.bucket,
                region = %s3.region,
                instance_credentials = s3.credentials.is_none(),
                "Using S3 backend"
            );
            Arc::new(
                S3BlobStore::new(s3.bucket, s3.region, s3.endpoint, s3.credentials)
                    .context("could not build S3 client")?,
            )
        }
    };

    let gate = BasicAuthGate::new(cfg.auth_credentials.clone());
    if !gate.is_enabled() {
        tracing::warn!("SERVICE_AUTH_LIST is empty; upload routes are open to anyone");
    }

    // --- Initialize core service ---
    let uploads = UploadService::new(store, KeyGenerator::new(), cfg.upload_policy());
    let state = AppState::new(uploads, cfg.max_batch_items, cfg.request_timeout);

    // --- Build router ---
    let app: Router = routes::routes::routes(gate, cfg.max_body_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("could not listen for shutdown signal: {}", err);
        return;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
