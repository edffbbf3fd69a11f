//! Signature sniffing: identify an image format from its leading bytes.
//!
//! Only the first [`SNIFF_LEN`] bytes are inspected. A buffer too short to hold
//! a signature simply does not match it.

use crate::models::upload::ImageFormat;

/// Longest signature checked. Nothing past this offset is read.
pub const SNIFF_LEN: usize = 8;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
// "GIF8", shared by GIF87a and GIF89a.
const GIF_MAGIC: &[u8] = &[0x47, 0x49, 0x46, 0x38];

/// Signatures in priority order. First match wins.
const SIGNATURES: [(&[u8], ImageFormat); 3] = [
    (JPEG_MAGIC, ImageFormat::Jpeg),
    (PNG_MAGIC, ImageFormat::Png),
    (GIF_MAGIC, ImageFormat::Gif),
];

/// Classify `buffer` by its magic bytes.
pub fn classify(buffer: &[u8]) -> ImageFormat {
    let header = &buffer[..buffer.len().min(SNIFF_LEN)];
    SIGNATURES
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map(|(_, format)| *format)
        .unwrap_or(ImageFormat::Unknown)
}
