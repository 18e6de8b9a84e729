#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::content::ContentHandle;
use crate::pipeline::OpaqueTransform;
use sigtuna_core::{algorithm, TransformError};

/// Decodes base64-encoded content into raw octets.
///
/// DOM input is materialized to bytes first; whitespace is stripped
/// before decoding, matching the lax handling digest values get on the
/// wire.
pub struct Base64DecodeTransform;

impl OpaqueTransform for Base64DecodeTransform {
    fn uri(&self) -> &'static str {
        algorithm::BASE64
    }

    fn apply(&self, mut input: ContentHandle) -> Result<ContentHandle, TransformError> {
        use base64::Engine;

        let bytes = input.as_bytes()?;
        let text = std::str::from_utf8(&bytes).map_err(|e| TransformError::MalformedParameters {
            uri: algorithm::BASE64.to_owned(),
            reason: format!("input not UTF-8: {e}"),
        })?;
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|e| TransformError::MalformedParameters {
                uri: algorithm::BASE64.to_owned(),
                reason: format!("decode error: {e}"),
            })?;

        Ok(ContentHandle::from_bytes(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_with_embedded_whitespace() {
        let t = Base64DecodeTransform;
        let input = ContentHandle::from_bytes(b"aGVs\n bG8=".to_vec());
        let mut out = t.apply(input).unwrap();
        assert_eq!(out.as_bytes().unwrap(), b"hello");
    }

    #[test]
    fn rejects_invalid_base64() {
        let t = Base64DecodeTransform;
        let input = ContentHandle::from_bytes(b"!!!".to_vec());
        assert!(t.apply(input).is_err());
    }
}
