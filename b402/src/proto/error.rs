//! Payment verification errors.
//!
//! Every way a payment attempt can fail has its own variant and its own
//! machine-readable [`ErrorReason`]: clients remediate differently depending
//! on the reason (re-sign, wait, fund the wallet, give up), so failures are
//! never collapsed into a generic error.

use serde::{Deserialize, Serialize};

use crate::amount::TokenAmount;

/// Errors that end a payment attempt before the protected operation runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The request carried no payment header.
    #[error("Payment required")]
    MissingPayment,
    /// The payment header could not be decoded into a payload.
    #[error("Malformed payment payload: {0}")]
    MalformedPayload(String),
    /// The signature does not match the authorization.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// The authorization's `validBefore` has passed.
    #[error("Payment authorization is expired")]
    AuthorizationExpired,
    /// The authorization's `validAfter` lies in the future.
    #[error("Payment authorization is not yet valid")]
    AuthorizationNotYetValid,
    /// The authorized value differs from the required amount.
    #[error("Payment amount {actual} does not match required amount {expected}")]
    AmountMismatch {
        /// Amount demanded by the requirement.
        expected: TokenAmount,
        /// Amount carried by the authorization.
        actual: TokenAmount,
    },
    /// The payload targets another network or protocol.
    #[error("Payment network does not match the payment requirement")]
    NetworkMismatch,
    /// The payload pays with another token.
    #[error("Payment token does not match the payment requirement")]
    AssetMismatch,
    /// The payload pays another recipient.
    #[error("Payment recipient does not match the payment requirement")]
    RecipientMismatch,
    /// The authorization nonce has already been consumed.
    #[error("Authorization nonce already used")]
    NonceReplay,
    /// The payer cannot cover the amount.
    #[error("Onchain balance is not enough to cover the payment amount")]
    InsufficientFunds,
    /// The verifier accepted the payload but the transfer did not go through.
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),
    /// The verifier could not be reached or did not answer in time.
    #[error("Payment verifier unreachable: {0}")]
    VerifierUnreachable(String),
}

impl VerificationError {
    /// Returns the machine-readable reason code for this error.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::MissingPayment => ErrorReason::MissingPayment,
            Self::MalformedPayload(_) => ErrorReason::MalformedPayload,
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::AuthorizationExpired => ErrorReason::AuthorizationExpired,
            Self::AuthorizationNotYetValid => ErrorReason::AuthorizationNotYetValid,
            Self::AmountMismatch { .. } => ErrorReason::AmountMismatch,
            Self::NetworkMismatch => ErrorReason::NetworkMismatch,
            Self::AssetMismatch => ErrorReason::AssetMismatch,
            Self::RecipientMismatch => ErrorReason::RecipientMismatch,
            Self::NonceReplay => ErrorReason::NonceReplay,
            Self::InsufficientFunds => ErrorReason::InsufficientFunds,
            Self::SettlementFailed(_) => ErrorReason::SettlementFailed,
            Self::VerifierUnreachable(_) => ErrorReason::VerifierUnreachable,
        }
    }
}

impl From<serde_json::Error> for VerificationError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}

/// Machine-readable reason codes for payment failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// No payment was presented.
    MissingPayment,
    /// The payment header could not be decoded.
    MalformedPayload,
    /// The signature is invalid.
    InvalidSignature,
    /// The authorization has expired.
    AuthorizationExpired,
    /// The authorization is not valid yet.
    AuthorizationNotYetValid,
    /// The authorized amount is wrong.
    AmountMismatch,
    /// The network does not match.
    NetworkMismatch,
    /// The token does not match.
    AssetMismatch,
    /// The recipient does not match.
    RecipientMismatch,
    /// The nonce was already consumed.
    NonceReplay,
    /// The payer's balance is too low.
    InsufficientFunds,
    /// On-chain settlement failed.
    SettlementFailed,
    /// The verifier is unreachable.
    VerifierUnreachable,
}

impl ErrorReason {
    /// Returns the `snake_case` string used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingPayment => "missing_payment",
            Self::MalformedPayload => "malformed_payload",
            Self::InvalidSignature => "invalid_signature",
            Self::AuthorizationExpired => "authorization_expired",
            Self::AuthorizationNotYetValid => "authorization_not_yet_valid",
            Self::AmountMismatch => "amount_mismatch",
            Self::NetworkMismatch => "network_mismatch",
            Self::AssetMismatch => "asset_mismatch",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::NonceReplay => "nonce_replay",
            Self::InsufficientFunds => "insufficient_funds",
            Self::SettlementFailed => "settlement_failed",
            Self::VerifierUnreachable => "verifier_unreachable",
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serde_matches_as_str() {
        let reasons = [
            ErrorReason::MissingPayment,
            ErrorReason::MalformedPayload,
            ErrorReason::InvalidSignature,
            ErrorReason::AuthorizationExpired,
            ErrorReason::AuthorizationNotYetValid,
            ErrorReason::AmountMismatch,
            ErrorReason::NetworkMismatch,
            ErrorReason::AssetMismatch,
            ErrorReason::RecipientMismatch,
            ErrorReason::NonceReplay,
            ErrorReason::InsufficientFunds,
            ErrorReason::SettlementFailed,
            ErrorReason::VerifierUnreachable,
        ];
        for reason in reasons {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn test_errors_keep_distinct_reasons() {
        assert_eq!(
            VerificationError::NonceReplay.reason(),
            ErrorReason::NonceReplay
        );
        assert_eq!(
            VerificationError::VerifierUnreachable("timeout".into()).reason(),
            ErrorReason::VerifierUnreachable
        );
        assert_ne!(
            VerificationError::SettlementFailed("reverted".into()).reason(),
            VerificationError::InvalidSignature("bad".into()).reason()
        );
    }
}
