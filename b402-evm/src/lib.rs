#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-712 signing and signer recovery for b402 payments on BNB Chain.
//!
//! A b402 payment is an EIP-3009 style `TransferWithAuthorization` message
//! signed under the `B402` EIP-712 domain. The domain binds the signature to
//! one chain and one relayer contract, so an authorization signed for
//! `bsc-testnet` can never be replayed on `bsc`.
//!
//! # Modules
//!
//! - [`types`] - The typed-data struct and the signing domain
//! - [`signature`] - Recovering the signer of a [`PaymentPayload`](b402::PaymentPayload)
//! - `client` - Signing payloads for a [`PaymentRequirement`](b402::PaymentRequirement)
//!
//! # Feature Flags
//!
//! - `client` - Client-side payment signing with `alloy-signer-local`
//! - `telemetry` - Enables tracing instrumentation

pub mod signature;
pub mod types;

#[cfg(feature = "client")]
pub mod client;

pub use signature::{recover_payer, verify_payer};
pub use types::{
    B402_DOMAIN_NAME, B402_DOMAIN_VERSION, TransferWithAuthorization, b402_domain, signing_hash,
};

#[cfg(feature = "client")]
pub use client::{B402EvmClient, SignError, SignerLike, sign_payment};
