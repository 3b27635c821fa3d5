//! Errors answered by the service's own routes.
//!
//! Payment failures never reach this module: the b402 layer answers them
//! before a handler runs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use b402::PaymentRecord;
use serde_json::json;

/// Errors produced by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request body does not have the expected shape.
    #[error("{0}")]
    InvalidRequest(String),

    /// The operation failed after the payment settled.
    #[error("Operation failed")]
    OperationFailed {
        /// What went wrong.
        details: String,
        /// The settled payment, returned so the payer can reconcile.
        payment: PaymentRecord,
    },
}

impl AppError {
    /// Creates a request-shape error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, axum::Json(json!({ "error": message }))).into_response()
            }
            Self::OperationFailed { details, payment } => {
                let body = json!({
                    "error": "Operation failed",
                    "details": details,
                    "payment": payment,
                });
                (StatusCode::BAD_GATEWAY, axum::Json(body)).into_response()
            }
        }
    }
}
