//! A [`Verifier`] that talks to a _remote_ b402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] calls `POST /verify` and, if the facilitator accepts
//! the payload, `POST /settle`. Both requests carry the same JSON body:
//! `{ x402Version, paymentPayload, paymentRequirements }`.
//!
//! ## Error Handling
//!
//! Transport failures and timeouts become `verifier_unreachable`. A non-200
//! answer or an unreadable body becomes `settlement_failed`. Facilitator
//! reason strings are mapped onto [`VerificationError`] variants; reasons
//! this client does not know fall back to `invalid_signature` on verify and
//! `settlement_failed` on settle.

use std::fmt::Display;
use std::time::Duration;

use alloy_primitives::{Address, TxHash};
use b402::proto::{B402Version1, V1};
use b402::{PaymentPayload, PaymentRecord, PaymentRequirement, VerificationError, Verifier};
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

/// Body of both `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest<'a> {
    /// Protocol version (always 1).
    pub x402_version: B402Version1,
    /// The payload presented by the client.
    pub payment_payload: &'a PaymentPayload,
    /// The requirement the payload was issued against.
    pub payment_requirements: &'a PaymentRequirement,
}

/// Answer of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payload passed every check.
    pub is_valid: bool,
    /// Why the payload was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Recovered payer address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

/// Answer of `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the transfer went through.
    pub success: bool,
    /// Why settlement failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Settlement transaction hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TxHash>,
    /// Address that paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
    /// Network the transfer settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// A client for communicating with a remote b402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error, including timeouts.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<FacilitatorClientError> for VerificationError {
    fn from(value: FacilitatorClientError) -> Self {
        match value {
            FacilitatorClientError::Http { .. }
            | FacilitatorClientError::ResponseBodyRead { .. }
            | FacilitatorClientError::UrlParse { .. } => {
                Self::VerifierUnreachable(value.to_string())
            }
            FacilitatorClientError::HttpStatus { .. }
            | FacilitatorClientError::JsonDeserialization { .. } => {
                Self::SettlementFailed(value.to_string())
            }
        }
    }
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns any custom headers configured on the client.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let settle_url =
            base_url
                .join("./settle")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./settle URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers (e.g. an API key) to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn verify(
        &self,
        request: &FacilitatorRequest<'_>,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn settle(
        &self,
        request: &FacilitatorRequest<'_>,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Verifies, then settles, translating every failure into a [`VerificationError`].
    async fn verify_then_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> Result<PaymentRecord, VerificationError> {
        let request = FacilitatorRequest {
            x402_version: V1,
            payment_payload: payload,
            payment_requirements: requirement,
        };

        let verified = self.verify(&request).await?;
        if !verified.is_valid {
            let reason = verified.invalid_reason.unwrap_or_default();
            return Err(map_reason(&reason, requirement, payload)
                .unwrap_or(VerificationError::InvalidSignature(reason)));
        }

        let settled = self.settle(&request).await?;
        if !settled.success {
            let reason = settled.error_reason.unwrap_or_default();
            return Err(map_reason(&reason, requirement, payload)
                .unwrap_or(VerificationError::SettlementFailed(reason)));
        }
        let tx_hash = settled.transaction.ok_or_else(|| {
            VerificationError::SettlementFailed("facilitator returned no transaction hash".into())
        })?;

        Ok(PaymentRecord {
            payer: settled.payer.or(verified.payer).unwrap_or_else(|| payload.payer()),
            tx_hash,
            amount: payload.payload.authorization.value,
            token: payload.token,
        })
    }

    /// Generic POST helper that handles JSON serialization, error mapping,
    /// timeout application, and telemetry integration.
    ///
    /// `context` is a human-readable identifier used in tracing and error
    /// messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

impl Verifier for FacilitatorClient {
    #[cfg(feature = "telemetry")]
    async fn verify_and_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> Result<PaymentRecord, VerificationError> {
        self.verify_then_settle(requirement, payload)
            .instrument(tracing::info_span!(
                "b402.facilitator_client.verify_and_settle",
                payer = %payload.payer(),
                timeout = ?self.timeout,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            ))
            .await
    }

    #[cfg(not(feature = "telemetry"))]
    async fn verify_and_settle(
        &self,
        requirement: &PaymentRequirement,
        payload: &PaymentPayload,
    ) -> Result<PaymentRecord, VerificationError> {
        self.verify_then_settle(requirement, payload).await
    }
}

/// Maps a facilitator reason string onto a specific error, if recognised.
///
/// Accepts both this crate's snake_case codes and the longer
/// `invalid_exact_evm_payload_*` codes used by EVM facilitators.
fn map_reason(
    reason: &str,
    requirement: &PaymentRequirement,
    payload: &PaymentPayload,
) -> Option<VerificationError> {
    let error = match reason {
        "invalid_signature" | "invalid_exact_evm_payload_signature" => {
            VerificationError::InvalidSignature(reason.to_owned())
        }
        "authorization_expired" | "invalid_exact_evm_payload_authorization_valid_before" => {
            VerificationError::AuthorizationExpired
        }
        "authorization_not_yet_valid" | "invalid_exact_evm_payload_authorization_valid_after" => {
            VerificationError::AuthorizationNotYetValid
        }
        "amount_mismatch" | "invalid_exact_evm_payload_authorization_value" => {
            VerificationError::AmountMismatch {
                expected: requirement.max_amount_required,
                actual: payload.payload.authorization.value,
            }
        }
        "network_mismatch" | "invalid_network" => VerificationError::NetworkMismatch,
        "asset_mismatch" | "invalid_exact_evm_payload_asset" => VerificationError::AssetMismatch,
        "recipient_mismatch" | "invalid_exact_evm_payload_recipient_mismatch" => {
            VerificationError::RecipientMismatch
        }
        "nonce_replay" | "nonce_already_used" | "authorization_already_used" => {
            VerificationError::NonceReplay
        }
        "insufficient_funds" => VerificationError::InsufficientFunds,
        "settlement_failed" => VerificationError::SettlementFailed(reason.to_owned()),
        _ => return None,
    };
    Some(error)
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `FacilitatorClient`.
impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Records the outcome of a request on the current span.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
