//! Represents one image upload and its outcome.

use crate::{errors::UploadError, services::decoder, services::keys::StorageKey};
use bytes::Bytes;
use serde::Serialize;

/// Image formats recognised from their leading byte signature.
///
/// The format is always derived from the payload itself and is never taken
/// from a client-supplied extension or MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Unknown,
}

impl ImageFormat {
    /// MIME type recorded on the stored object.
    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Unknown => "application/octet-stream",
        }
    }
}

/// Raw bytes as submitted by the client, before decoding.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Base64 text, optionally prefixed with `data:image/<type>;base64,`.
    Base64(String),
    /// Binary body taken straight from a multipart part.
    Bytes(Bytes),
    /// An item the request parser could not make sense of.
    Malformed(String),
}

impl Payload {
    /// Decode the payload into the bytes that will be validated and stored.
    pub fn decode(self) -> Result<Bytes, UploadError> {
        match self {
            Payload::Base64(text) => decoder::decode_base64(&text)
                .map(Bytes::from)
                .map_err(|err| UploadError::Decoding(err.to_string())),
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Malformed(reason) => Err(UploadError::Decoding(reason)),
        }
    }
}

/// A single file submitted for upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: Payload,

    /// Filename as declared by the client. Sanitized before it reaches a key.
    pub filename: String,

    /// Application the upload belongs to (the `appname` field on the wire).
    pub application_id: String,
}

impl UploadRequest {
    pub fn new(
        payload: Payload,
        filename: impl Into<String>,
        application_id: impl Into<String>,
    ) -> Self {
        Self {
            payload,
            filename: filename.into(),
            application_id: application_id.into(),
        }
    }

    pub fn base64(
        data: impl Into<String>,
        filename: impl Into<String>,
        application_id: impl Into<String>,
    ) -> Self {
        Self::new(Payload::Base64(data.into()), filename, application_id)
    }

    pub fn bytes(
        data: impl Into<Bytes>,
        filename: impl Into<String>,
        application_id: impl Into<String>,
    ) -> Self {
        Self::new(Payload::Bytes(data.into()), filename, application_id)
    }

    /// A placeholder for an item that failed request-level parsing. It keeps
    /// its slot in the batch and resolves to a decoding error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(Payload::Malformed(reason.into()), "", "")
    }
}

/// A successfully persisted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: StorageKey,
    pub url: String,
    pub format: ImageFormat,
}

/// Outcome of one upload request.
pub type UploadResult = Result<StoredImage, UploadError>;

/// Outcomes of a batch, index-aligned with the submitted requests.
pub type BatchResult = Vec<UploadResult>;
