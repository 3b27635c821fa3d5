//! Tower middleware for enforcing b402 payments on protected routes.
//!
//! Requests without an `X-PAYMENT` header are answered with
//! `402 Payment Required` and the route's [`PaymentRequirement`](b402::PaymentRequirement).
//! Requests with a header are decoded, prechecked against the requirement and
//! handed to a [`Verifier`](b402::Verifier). Only after the verifier reports a
//! settled transfer does the protected handler run, with the resulting
//! [`PaymentRecord`](b402::PaymentRecord) available as a request extension.
//!
//! See [`B402Middleware`] for configuration. For talking to a remote
//! facilitator, see [`facilitator_client::FacilitatorClient`].
//!
//! ## Configuration Notes
//!
//! - **[`B402Middleware::with_verifier_timeout`]** bounds each verify-and-settle call.
//! - **[`B402Middleware::with_base_url`]** sets the origin used to fill in the
//!   requirement's `resource` when none is configured.
//! - **[`B402LayerBuilder::with_request_validator`]** checks the request body
//!   after the payment header is decoded and before anything is settled.

pub mod error;
pub mod facilitator_client;
pub mod layer;
pub mod paygate;

pub use error::PaygateError;
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use layer::{B402LayerBuilder, B402Middleware, B402MiddlewareService};
pub use paygate::{Paygate, RequestValidator};
