//! Per-request payment gate.
//!
//! [`Paygate`] walks one request through the challenge/response sequence:
//! no header yields a challenge; a header is decoded, optionally followed by a
//! body shape check, then prechecked locally and verified remotely. The inner
//! service is called at most once, and only after a settled payment.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use b402::{
    PaymentPayload, PaymentRecord, PaymentRequiredBody, PaymentRequirement, UnixTimestamp,
    VerificationError, Verifier,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use tower::Service;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

use super::error::PaygateError;
use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use crate::headers::{decode_payment_payload, encode_payment_response};

/// Upper bound on a request body buffered for shape validation.
pub const MAX_VALIDATED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Checks the shape of a request body before any payment is settled.
///
/// Returns `Err(message)` to reject the request with `400 Bad Request`.
#[derive(Clone)]
pub struct RequestValidator(Arc<dyn Fn(&[u8]) -> Result<(), String> + Send + Sync>);

impl RequestValidator {
    /// Wraps a validation function.
    pub fn new<F>(validate: F) -> Self
    where
        F: Fn(&[u8]) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(validate))
    }

    /// Runs the validator against a buffered body.
    ///
    /// # Errors
    ///
    /// Returns the validator's message when the body is rejected.
    pub fn validate(&self, body: &[u8]) -> Result<(), String> {
        (self.0)(body)
    }
}

impl fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestValidator(..)")
    }
}

/// Payment gate for a single request.
#[allow(missing_debug_implementations)]
pub struct Paygate<V> {
    /// Collaborator that verifies signatures and settles transfers
    pub verifier: V,
    /// Requirement issued for the protected route
    pub requirement: Arc<PaymentRequirement>,
    /// Bound on one verify-and-settle call
    pub verifier_timeout: Duration,
    /// Optional body shape check run before settlement
    pub validator: Option<RequestValidator>,
}

impl<V> Paygate<V> {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Result<S::Response, S::Error>
    where
        S: Service<Request>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }
}

impl<V> Paygate<V>
where
    V: Verifier,
{
    /// Handles an incoming request, processing payment if required.
    ///
    /// Payment failures are turned into responses by [`error_into_response`].
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "b402.handle_request", skip_all, fields(path = %req.uri().path()))
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request>,
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(error_into_response(err, &self.requirement)),
        }
    }

    /// Handles an incoming request, returning errors as [`PaygateError`].
    ///
    /// This is the fallible version of [`Self::handle_request`]: instead of a
    /// 402 response the caller receives the error itself.
    ///
    /// # Errors
    ///
    /// Returns [`PaygateError`] if the payment is missing, malformed or
    /// rejected, or the body fails validation.
    pub async fn handle_request_fallible<S>(
        &self,
        inner: S,
        req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request>,
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let header =
            extract_payment_header(req.headers()).ok_or(VerificationError::MissingPayment)?;
        let payload = decode_payment_payload(header).map_err(VerificationError::from)?;

        let mut req = match &self.validator {
            Some(validator) => validate_body(validator, req).await?,
            None => req,
        };

        self.requirement.check_payload(&payload, UnixTimestamp::now())?;

        let record = self.verify_and_settle(&payload).await?;

        #[cfg(feature = "telemetry")]
        tracing::info!(
            payer = %record.payer,
            tx_hash = %record.tx_hash,
            amount = %record.amount,
            "payment settled"
        );

        let header_value = record_to_header(&record)?;
        req.extensions_mut().insert(record);

        let mut response = match Self::call_inner(inner, req).await {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response(),
        };
        let headers = response.headers_mut();
        headers.insert(X_PAYMENT_RESPONSE_HEADER, header_value);
        headers.insert(
            http::header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
        );
        Ok(response)
    }

    /// Calls the verifier, bounded by the configured timeout.
    async fn verify_and_settle(
        &self,
        payload: &PaymentPayload,
    ) -> Result<PaymentRecord, VerificationError> {
        let settle = self.verifier.verify_and_settle(&self.requirement, payload);
        tokio::time::timeout(self.verifier_timeout, settle)
            .await
            .unwrap_or_else(|_| {
                Err(VerificationError::VerifierUnreachable(format!(
                    "no answer within {}s",
                    self.verifier_timeout.as_secs_f32()
                )))
            })
    }
}

/// Extracts the payment header value from the header map.
fn extract_payment_header(header_map: &HeaderMap) -> Option<&[u8]> {
    header_map.get(X_PAYMENT_HEADER).map(HeaderValue::as_bytes)
}

/// Buffers the body, runs the validator and rebuilds the request.
async fn validate_body(
    validator: &RequestValidator,
    req: Request,
) -> Result<Request, PaygateError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_VALIDATED_BODY_BYTES)
        .await
        .map_err(|e| PaygateError::InvalidRequest(format!("Failed to read request body: {e}")))?;
    validator
        .validate(&bytes)
        .map_err(PaygateError::InvalidRequest)?;
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Encodes a [`PaymentRecord`] as an `X-PAYMENT-RESPONSE` header value.
fn record_to_header(record: &PaymentRecord) -> Result<HeaderValue, PaygateError> {
    let encoded = encode_payment_response(record)
        .map_err(|err| PaygateError::ResponseEncoding(err.to_string()))?;
    HeaderValue::from_str(&encoded).map_err(|err| PaygateError::ResponseEncoding(err.to_string()))
}

/// HTTP status for a payment failure.
#[must_use]
pub const fn status_for(err: &VerificationError) -> StatusCode {
    match err {
        VerificationError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        VerificationError::VerifierUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::PAYMENT_REQUIRED,
    }
}

/// Converts a [`PaygateError`] into an HTTP response.
///
/// Payment failures carry the requirement so the client can try again;
/// a missing payment yields the plain challenge.
#[must_use]
pub fn error_into_response(err: PaygateError, requirement: &PaymentRequirement) -> Response {
    match err {
        PaygateError::Verification(VerificationError::MissingPayment) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(PaymentRequiredBody::challenge(requirement.clone())),
        )
            .into_response(),
        PaygateError::Verification(err) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(reason = %err.reason(), error = %err, "payment rejected");
            (
                status_for(&err),
                Json(PaymentRequiredBody::rejected(&err, requirement.clone())),
            )
                .into_response()
        }
        PaygateError::InvalidRequest(message) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        PaygateError::ResponseEncoding(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&VerificationError::MalformedPayload("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&VerificationError::VerifierUnreachable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&VerificationError::NonceReplay),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&VerificationError::SettlementFailed("x".into())),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_validator_reports_message() {
        let validator = RequestValidator::new(|body| {
            if body.is_empty() {
                Err("empty body".into())
            } else {
                Ok(())
            }
        });
        assert_eq!(validator.validate(b""), Err("empty body".to_owned()));
        assert_eq!(validator.validate(b"{}"), Ok(()));
    }
}
