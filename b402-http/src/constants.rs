//! HTTP-specific constants for the b402 protocol.

/// Header carrying the base64 JSON [`PaymentPayload`](b402::PaymentPayload) (client to server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Header carrying the base64 JSON [`PaymentRecord`](b402::PaymentRecord) (server to client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";
