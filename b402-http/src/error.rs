//! Error types for the HTTP transport layer.

use b402::VerificationError;
use b402::encoding::DecodeError;

/// Errors that can occur during HTTP header encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The header value is not base64 JSON of the expected shape.
    #[error("malformed header: {0}")]
    Decode(#[from] DecodeError),
}

impl From<HttpError> for VerificationError {
    fn from(value: HttpError) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}
