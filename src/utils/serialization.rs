// src/utils/serialization.rs
//! Serialization utilities for the credential flow.
//!
//! Provides serialization and deserialization functions for:
//! - JSON data structures
//! - Base64url-encoded JSON segments (as found in compact JWTs)

use serde::{de::DeserializeOwned, Serialize};

use crate::error::PresentationError;

/// Serializes a value to a JSON string.
///
/// # Arguments
/// * `data` - The value to serialize (must implement `Serialize`)
///
/// # Returns
/// - `Ok(String)` with JSON representation on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Encodes a value as unpadded base64url JSON.
///
/// # Returns
/// The encoded segment, or the serialization error
pub fn encode_base64url_json<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let json = serialize(data)?;
    Ok(base64::encode_config(json, base64::URL_SAFE_NO_PAD))
}

/// Decodes an unpadded (or padded) base64url JSON segment.
///
/// # Errors
/// - [`PresentationError::Base64`] if the segment is not base64url
/// - [`PresentationError::Json`] if the decoded bytes are not the expected JSON
pub fn decode_base64url_json<T: DeserializeOwned>(segment: &str) -> Result<T, PresentationError> {
    let bytes = base64::decode_config(segment.trim_end_matches('='), base64::URL_SAFE_NO_PAD)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_base64url_json_roundtrip_has_no_padding() {
        let value = json!({ "iss": "did:icp:subject", "n": 1 });
        let encoded = encode_base64url_json(&value).unwrap();
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        let decoded: Value = decode_base64url_json(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_base64url_json::<Value>("***"),
            Err(PresentationError::Base64(_))
        ));
        let not_json = base64::encode_config("not json", base64::URL_SAFE_NO_PAD);
        assert!(matches!(
            decode_base64url_json::<Value>(&not_json),
            Err(PresentationError::Json(_))
        ));
    }
}
