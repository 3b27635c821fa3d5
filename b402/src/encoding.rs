//! Base64 JSON codec for payment headers.
//!
//! Both payment headers carry standard-alphabet, padded base64 of a compact
//! JSON document: `X-PAYMENT` holds a [`PaymentPayload`](crate::PaymentPayload)
//! and `X-PAYMENT-RESPONSE` a [`PaymentRecord`](crate::PaymentRecord).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::proto::VerificationError;

/// Errors from decoding a base64 JSON header value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The value is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DecodeError> for VerificationError {
    fn from(value: DecodeError) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}

/// Serializes `value` to JSON and base64-encodes it.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

/// Decodes a base64 header value and parses the JSON inside.
///
/// Surrounding ASCII whitespace is ignored.
///
/// # Errors
///
/// Returns [`DecodeError`] if the value is not base64 or not the expected JSON.
pub fn decode_json<T: DeserializeOwned>(encoded: impl AsRef<[u8]>) -> Result<T, DecodeError> {
    let bytes = b64.decode(encoded.as_ref().trim_ascii())?;
    Ok(serde_json::from_slice(&bytes)?)
}
