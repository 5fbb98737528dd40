//! Decoding of tracker text fields.
//!
//! Depending on server version and configuration, the tracker sends some
//! text fields as base64-encoded gzip streams and others as plain text.
//! [`decode`] handles both and never fails.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use flate2::read::GzDecoder;
use std::io::Read;

/// Decodes a possibly base64+gzip encoded field.
///
/// If any step fails the original text is returned unchanged.
pub fn decode(raw: &str) -> String {
    match try_decode(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::trace!("field is not base64+gzip ({e}), using it verbatim");
            raw.to_string()
        }
    }
}

fn try_decode(raw: &str) -> anyhow::Result<String> {
    let compressed = BASE64.decode(raw.trim())?;
    let mut text = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut text)?;
    Ok(text)
}
