#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the b402 payment protocol.
//!
//! Provides header encoding/decoding, constants, and (feature-gated)
//! client/server middleware.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names
//! - [`headers`] - Base64 encoding/decoding for b402 HTTP headers
//! - [`error`] - HTTP transport error types
//! - `server` - Tower layer enforcing payments and a remote facilitator client (feature: `server`)
//! - `client` - Reqwest middleware that pays 402 challenges (feature: `client`)

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
