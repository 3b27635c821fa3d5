//! HTTP header encoding and decoding for b402 protocol messages.
//!
//! Handles the base64-encoded JSON carried in `X-PAYMENT` and
//! `X-PAYMENT-RESPONSE`.

use b402::encoding::{decode_json, encode_json};
use b402::{PaymentPayload, PaymentRecord};

use crate::error::HttpError;

/// Encodes a [`PaymentPayload`] for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_payload(payload: &PaymentPayload) -> Result<String, HttpError> {
    Ok(encode_json(payload)?)
}

/// Decodes an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`HttpError::Decode`] on base64 or JSON decode failure, including
/// an unknown version, scheme or network.
pub fn decode_payment_payload(header_value: &[u8]) -> Result<PaymentPayload, HttpError> {
    Ok(decode_json(header_value)?)
}

/// Encodes a [`PaymentRecord`] for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_response(record: &PaymentRecord) -> Result<String, HttpError> {
    Ok(encode_json(record)?)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`HttpError::Decode`] on base64 or JSON decode failure.
pub fn decode_payment_response(header_value: &[u8]) -> Result<PaymentRecord, HttpError> {
    Ok(decode_json(header_value)?)
}
