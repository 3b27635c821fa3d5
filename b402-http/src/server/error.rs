//! Error types for the b402 payment gate middleware.

use b402::VerificationError;

/// Everything that can stop a request at the payment gate.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// The payment was missing, malformed, or rejected.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The request body failed the route's shape validator.
    #[error("{0}")]
    InvalidRequest(String),
    /// The settlement record could not be turned into a response header.
    #[error("Failed to encode payment response: {0}")]
    ResponseEncoding(String),
}
