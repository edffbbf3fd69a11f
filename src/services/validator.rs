//! Size and type policy for decoded uploads.

use crate::{models::upload::ImageFormat, services::sniffer};
use thiserror::Error;

/// Default upper bound on a single decoded file (5 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Reason a payload was refused by policy. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("size limit exceeded")]
    SizeLimitExceeded { size: usize, max: usize },
    #[error("unsupported or unrecognized file type")]
    UnsupportedType,
}

/// Verdict on a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(ImageFormat),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    /// Format detected from the payload. Oversized payloads are never
    /// sniffed and report `Unknown`.
    pub fn detected_type(&self) -> ImageFormat {
        match self {
            ValidationOutcome::Accepted(format) => *format,
            ValidationOutcome::Rejected(_) => ImageFormat::Unknown,
        }
    }

    pub fn rejection_reason(&self) -> Option<&Rejection> {
        match self {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<ImageFormat, Rejection> {
        match self {
            ValidationOutcome::Accepted(format) => Ok(format),
            ValidationOutcome::Rejected(reason) => Err(reason),
        }
    }
}

/// Apply size then type policy to `payload`.
///
/// The size check runs first so oversized buffers are refused without being
/// classified. The accepted format is what gets recorded as the stored
/// content type.
pub fn validate(payload: &[u8], max_size: usize) -> ValidationOutcome {
    if payload.len() > max_size {
        return ValidationOutcome::Rejected(Rejection::SizeLimitExceeded {
            size: payload.len(),
            max: max_size,
        });
    }

    match sniffer::classify(payload) {
        ImageFormat::Unknown => ValidationOutcome::Rejected(Rejection::UnsupportedType),
        format => ValidationOutcome::Accepted(format),
    }
}
