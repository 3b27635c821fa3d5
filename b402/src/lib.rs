#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the b402 payment protocol.
//!
//! b402 gates HTTP resources behind a gasless token transfer on BNB Chain.
//! When a client requests a paid resource without payment, the server answers
//! `402 Payment Required` together with a [`proto::PaymentRequirement`]. The
//! client signs an EIP-3009 style [`proto::Authorization`] under an EIP-712
//! domain, wraps it in a [`proto::PaymentPayload`] and repeats the request.
//! The server hands the payload to a [`verifier::Verifier`], which checks the
//! signature and settles the transfer on-chain, and only then serves the
//! resource.
//!
//! This crate is chain-library agnostic apart from `alloy-primitives` for
//! addresses and 256-bit integers. Signing lives in `b402-evm`, HTTP
//! plumbing in `b402-http`.
//!
//! # Modules
//!
//! - [`amount`] - 256-bit token amounts carried as decimal strings
//! - [`encoding`] - Base64 JSON codec for payment headers
//! - [`networks`] - Supported BNB Chain networks and their default tokens
//! - [`proto`] - Wire format types and verification errors
//! - [`timestamp`] - Unix timestamps for authorization windows
//! - [`verifier`] - The verify-and-settle collaborator contract
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod encoding;
pub mod networks;
pub mod proto;
pub mod timestamp;
pub mod verifier;

pub use amount::TokenAmount;
pub use networks::Network;
pub use proto::{
    Authorization, ErrorReason, ExactPayload, ExactScheme, PaymentPayload, PaymentRecord,
    PaymentRequiredBody, PaymentRequirement, VerificationError,
};
pub use timestamp::UnixTimestamp;
pub use verifier::Verifier;
