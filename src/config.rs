use crate::{
    auth::Credential,
    services::{
        s3_store::S3Credentials, upload_service::UploadPolicy, validator::DEFAULT_MAX_FILE_SIZE,
    },
};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};
use thiserror::Error;

/// Fatal startup misconfiguration. The process refuses to serve.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("{0} is required when the s3 backend is selected")]
    MissingS3Setting(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Objects on the local filesystem
    Local,
    /// Objects in an S3-compatible bucket
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// `None` only when instance credentials were explicitly requested.
    pub credentials: Option<S3Credentials>,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub public_base_url: String,
    pub s3: Option<S3Settings>,
    pub namespace: String,
    pub max_file_size: usize,
    pub max_batch_items: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub auth_credentials: Vec<Credential>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image upload gateway")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_GATEWAY_PORT / PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store backend (overrides IMAGE_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory for the local backend (overrides IMAGE_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// URL prefix the local backend publishes objects under (overrides IMAGE_GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// S3 bucket (overrides AWS_S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 region (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint for compatible providers (overrides AWS_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Use the instance credential provider instead of AWS_ACCESS_KEY_ID /
    /// AWS_SECRET_ACCESS_KEY (or IMAGE_GATEWAY_S3_INSTANCE_CREDENTIALS=true)
    #[arg(long)]
    pub s3_instance_credentials: bool,

    /// Leading key segment (overrides IMAGE_GATEWAY_NAMESPACE)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Largest accepted decoded file in bytes (overrides IMAGE_GATEWAY_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<usize>,

    /// Most `files` parts per multipart batch request (overrides IMAGE_GATEWAY_MAX_BATCH_ITEMS)
    #[arg(long)]
    pub max_batch_items: Option<usize>,

    /// Concurrent store writes per batch (overrides IMAGE_GATEWAY_MAX_CONCURRENCY)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Seconds before an upload request is cancelled (overrides IMAGE_GATEWAY_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self, ConfigError> {
        let args = Args::parse();
        Self::from_sources(args, |name| env::var(name).ok())
    }

    /// Merge parsed CLI args over values looked up through `env`.
    pub fn from_sources<F>(args: Args, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_port = match env("IMAGE_GATEWAY_PORT").or_else(|| env("PORT")) {
            Some(value) => parse_value("IMAGE_GATEWAY_PORT", &value)?,
            None => 3000,
        };
        let env_backend = match env("IMAGE_GATEWAY_BACKEND") {
            Some(value) => <BackendKind as ValueEnum>::from_str(&value, true).map_err(|_| {
                ConfigError::InvalidValue {
                    name: "IMAGE_GATEWAY_BACKEND",
                    value,
                }
            })?,
            None => BackendKind::Local,
        };

        let backend = args.backend.unwrap_or(env_backend);
        let s3 = match backend {
            BackendKind::Local => None,
            BackendKind::S3 => Some(S3Settings {
                bucket: args
                    .bucket
                    .or_else(|| env("AWS_S3_BUCKET"))
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(ConfigError::MissingS3Setting("AWS_S3_BUCKET"))?,
                region: args
                    .region
                    .or_else(|| env("AWS_REGION"))
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(ConfigError::MissingS3Setting("AWS_REGION"))?,
                endpoint: args.endpoint.or_else(|| env("AWS_ENDPOINT")),
                credentials: s3_credentials(args.s3_instance_credentials, &env)?,
            }),
        };

        // --- Merge ---
        let cfg = Self {
            host: args
                .host
                .or_else(|| env("IMAGE_GATEWAY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            backend,
            storage_dir: args
                .storage_dir
                .or_else(|| env("IMAGE_GATEWAY_STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            public_base_url: args
                .public_url
                .or_else(|| env("IMAGE_GATEWAY_PUBLIC_URL"))
                .unwrap_or_else(|| "http://localhost:3000/objects".into()),
            s3,
            namespace: args
                .namespace
                .or_else(|| env("IMAGE_GATEWAY_NAMESPACE"))
                .unwrap_or_else(|| "user-logos".into()),
            max_file_size: merge(
                args.max_file_size,
                &env,
                "IMAGE_GATEWAY_MAX_FILE_SIZE",
                DEFAULT_MAX_FILE_SIZE,
            )?,
            max_batch_items: merge(args.max_batch_items, &env, "IMAGE_GATEWAY_MAX_BATCH_ITEMS", 5)?,
            max_concurrency: merge(args.max_concurrency, &env, "IMAGE_GATEWAY_MAX_CONCURRENCY", 4)?,
            request_timeout: Duration::from_secs(merge(
                args.request_timeout_secs,
                &env,
                "IMAGE_GATEWAY_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            max_body_bytes: merge(None, &env, "IMAGE_GATEWAY_MAX_BODY_BYTES", 64 * 1024 * 1024)?,
            auth_credentials: env("SERVICE_AUTH_LIST")
                .map(|list| Credential::parse_list(&list))
                .unwrap_or_default(),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("IMAGE_GATEWAY_MAX_FILE_SIZE", self.max_file_size as u64),
            ("IMAGE_GATEWAY_MAX_BATCH_ITEMS", self.max_batch_items as u64),
            ("IMAGE_GATEWAY_MAX_CONCURRENCY", self.max_concurrency as u64),
            ("IMAGE_GATEWAY_REQUEST_TIMEOUT_SECS", self.request_timeout.as_secs()),
            ("IMAGE_GATEWAY_MAX_BODY_BYTES", self.max_body_bytes as u64),
        ];
        match limits.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Zero { name: *name }),
            None => Ok(()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            namespace: self.namespace.clone(),
            max_file_size: self.max_file_size,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Static keys are required unless instance credentials were opted into.
fn s3_credentials<F>(instance_opt_in: bool, env: &F) -> Result<Option<S3Credentials>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let instance = match env("IMAGE_GATEWAY_S3_INSTANCE_CREDENTIALS") {
        Some(value) => parse_value("IMAGE_GATEWAY_S3_INSTANCE_CREDENTIALS", &value)?,
        None => false,
    };
    if instance_opt_in || instance {
        return Ok(None);
    }

    let required = |name: &'static str| {
        env(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingS3Setting(name))
    };
    Ok(Some(S3Credentials {
        access_key_id: required("AWS_ACCESS_KEY_ID")?,
        secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
    }))
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

/// CLI value if given, else the env var, else `default`.
fn merge<T, F>(cli: Option<T>, env: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match (cli, env(name)) {
        (Some(value), _) => Ok(value),
        (None, Some(raw)) => parse_value(name, &raw),
        (None, None) => Ok(default),
    }
}
