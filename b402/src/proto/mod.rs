//! Wire format types for b402 payment messages.
//!
//! # Key Types
//!
//! - [`PaymentRequirement`] - What the server demands, sent with a 402 challenge
//! - [`Authorization`] - The payer's EIP-3009 style transfer intent
//! - [`PaymentPayload`] - Signed authorization envelope sent back by the client
//! - [`PaymentRecord`] - Settlement outcome echoed to the caller
//! - [`PaymentRequiredBody`] - JSON body of 402 responses
//! - [`VerificationError`] / [`ErrorReason`] - Why a payment attempt failed
//!
//! # Wire Format
//!
//! All types serialize to JSON with camelCase field names. Amounts and
//! timestamps are decimal strings.

use alloy_primitives::{Address, B256, Bytes, TxHash};
use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;
use crate::networks::Network;
use crate::timestamp::UnixTimestamp;

mod error;
mod version;

pub use error::{ErrorReason, VerificationError};
pub use version::{B402Version1, ExactScheme, V1, Version};

/// Default authorization validity window, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 600;

/// Payment terms for a protected operation.
///
/// Amount, token, recipient and relayer are fixed by server configuration;
/// the same requirement is issued with every challenge for that operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Protocol version (always 1).
    pub version: B402Version1,
    /// Payment scheme (always `"exact"`).
    pub scheme: ExactScheme,
    /// Network the payment settles on.
    pub network: Network,
    /// Token contract address.
    pub asset: Address,
    /// Recipient of the payment.
    pub pay_to: Address,
    /// Amount in the token's smallest unit.
    pub max_amount_required: TokenAmount,
    /// How long a signed authorization stays valid.
    pub max_timeout_seconds: u64,
    /// Contract that executes the gasless transfer; also the EIP-712 verifying contract.
    pub relayer_contract: Address,
    /// Human-readable purpose of the payment.
    pub description: String,
    /// URL of the protected resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// MIME type of the protected resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl PaymentRequirement {
    /// Creates a requirement with the default timeout and an empty description.
    #[must_use]
    pub const fn new(
        network: Network,
        asset: Address,
        pay_to: Address,
        amount: TokenAmount,
        relayer_contract: Address,
    ) -> Self {
        Self {
            version: V1,
            scheme: ExactScheme,
            network,
            asset,
            pay_to,
            max_amount_required: amount,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            relayer_contract,
            description: String::new(),
            resource: None,
            mime_type: None,
        }
    }

    /// Sets the authorization validity window.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the protected resource URL.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the MIME type of the protected resource.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Checks a payload against this requirement without touching the chain.
    ///
    /// Covers everything that can be decided from the two messages alone:
    /// network, token, recipient, amount and the validity window. Signature,
    /// balance and nonce checks belong to the [`Verifier`](crate::Verifier).
    ///
    /// # Errors
    ///
    /// Returns the first [`VerificationError`] encountered.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "b402.check_payload",
            skip_all,
            fields(payer = %payload.payer()),
            err
        )
    )]
    pub fn check_payload(
        &self,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<(), VerificationError> {
        if payload.network != self.network {
            return Err(VerificationError::NetworkMismatch);
        }
        if payload.token != self.asset {
            return Err(VerificationError::AssetMismatch);
        }
        let authorization = &payload.payload.authorization;
        if authorization.to != self.pay_to {
            return Err(VerificationError::RecipientMismatch);
        }
        if authorization.value != self.max_amount_required {
            return Err(VerificationError::AmountMismatch {
                expected: self.max_amount_required,
                actual: authorization.value,
            });
        }
        if authorization.valid_after >= authorization.valid_before {
            return Err(VerificationError::MalformedPayload(
                "validAfter must precede validBefore".into(),
            ));
        }
        if authorization.valid_before <= now {
            return Err(VerificationError::AuthorizationExpired);
        }
        if authorization.valid_after > now {
            return Err(VerificationError::AuthorizationNotYetValid);
        }
        Ok(())
    }
}

/// The payer's signed intent to transfer `value` tokens from `from` to `to`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Token owner authorizing the transfer.
    pub from: Address,
    /// Recipient of the transfer.
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this time (inclusive).
    pub valid_after: UnixTimestamp,
    /// Expires at this time (exclusive).
    pub valid_before: UnixTimestamp,
    /// Random 32-byte nonce, unique per authorization.
    pub nonce: B256,
}

/// Signature and the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactPayload {
    /// EIP-712 typed-data signature over the authorization.
    pub signature: Bytes,
    /// The signed authorization.
    pub authorization: Authorization,
}

/// Envelope carried base64-encoded in the payment header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub protocol_version: B402Version1,
    /// Payment scheme (always `"exact"`).
    pub scheme: ExactScheme,
    /// Network echoed from the requirement.
    pub network: Network,
    /// Token address echoed from the requirement.
    pub token: Address,
    /// Signed authorization.
    pub payload: ExactPayload,
}

impl PaymentPayload {
    /// The address that signed the authorization.
    #[must_use]
    pub const fn payer(&self) -> Address {
        self.payload.authorization.from
    }
}

/// Outcome of a successful settlement, as observed by the resource server.
///
/// Informational only: the chain is the authority on what moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Address that paid.
    pub payer: Address,
    /// Settlement transaction hash.
    pub tx_hash: TxHash,
    /// Amount transferred.
    pub amount: TokenAmount,
    /// Token transferred.
    pub token: Address,
}

/// JSON body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequiredBody {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable failure reason, absent on a plain challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorReason>,
    /// The requirement the client must satisfy.
    pub x402: PaymentRequirement,
}

impl PaymentRequiredBody {
    /// Body of the initial challenge.
    #[must_use]
    pub fn challenge(requirement: PaymentRequirement) -> Self {
        Self {
            error: VerificationError::MissingPayment.to_string(),
            reason: None,
            x402: requirement,
        }
    }

    /// Body of a rejected payment attempt.
    #[must_use]
    pub fn rejected(err: &VerificationError, requirement: PaymentRequirement) -> Self {
        Self {
            error: err.to_string(),
            reason: Some(err.reason()),
            x402: requirement,
        }
    }
}
