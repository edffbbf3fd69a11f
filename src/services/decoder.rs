//! Base64 payload decoding.
//!
//! Clients send either bare base64 or a data URL such as
//! `data:image/png;base64,iVBOR...`. Decoding tolerates missing padding and
//! embedded whitespace (line-wrapped encoders) and accepts both the standard
//! and URL-safe alphabets.

use base64::{
    DecodeError, Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

#[derive(Debug, thiserror::Error)]
pub enum PayloadDecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] DecodeError),
}

/// Strip a leading `data:image/<subtype>;base64,` prefix, if present.
///
/// The subtype must be a single word (`png`, `jpeg`, `x_icon`...). Anything
/// else is left untouched and will fail to decode.
pub fn strip_data_url_prefix(input: &str) -> &str {
    let Some(rest) = input.strip_prefix("data:image/") else {
        return input;
    };
    let Some((subtype, data)) = rest.split_once(";base64,") else {
        return input;
    };
    let is_word = !subtype.is_empty()
        && subtype
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if is_word { data } else { input }
}

/// Decode client-supplied base64 text into raw bytes.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, PayloadDecodeError> {
    let data = strip_data_url_prefix(input.trim());
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(PayloadDecodeError::Empty);
    }

    let engine = if cleaned.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    Ok(engine.decode(cleaned.as_bytes())?)
}
