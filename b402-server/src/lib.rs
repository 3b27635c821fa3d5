//! Payment-gated AI processing service.
//!
//! Exposes `POST /process`, which forwards one message to a completion
//! provider, behind a b402 paywall settled on BNB Chain, plus an open
//! `GET /health`.
//!
//! # Modules
//!
//! - [`config`]: flags and environment validated into [`AppConfig`]
//! - [`routes`]: the router and its handlers
//! - [`provider`]: completion backends
//! - [`error`]: route error responses

pub mod config;
pub mod error;
pub mod provider;
pub mod routes;

pub use config::{AppConfig, ConfigError};
pub use error::AppError;
pub use provider::{CompletionProvider, OpenAiProvider, ProviderError};
pub use routes::{AppState, OperationOutcome, router};
