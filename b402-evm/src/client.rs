//! Client-side payload construction.
//!
//! [`sign_payment`] turns a [`PaymentRequirement`] received in a 402 challenge
//! into a signed [`PaymentPayload`]. [`B402EvmClient`] wraps a signer and adds
//! the header encoding step.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Signature};
use alloy_signer_local::PrivateKeySigner;
use b402::encoding::encode_json;
use b402::proto::V1;
use b402::{
    Authorization, ExactPayload, ExactScheme, PaymentPayload, PaymentRequirement, UnixTimestamp,
};
use rand::RngExt;
use rand::rng;

use crate::types::signing_hash;

/// Abstracts signing so that both owned and `Arc`-shared signers can pay.
///
/// Alloy's `Signer` is not implemented for `Arc<T>`, and `PrivateKeySigner`
/// is not `Clone`, so a shared signer needs this indirection.
pub trait SignerLike: Send + Sync {
    /// Address of the signer.
    fn address(&self) -> Address;

    /// Signs a 32-byte prehash.
    fn sign_hash(
        &self,
        hash: &B256,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Errors from building a payment payload.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The signer refused or failed to sign.
    #[error("failed to sign authorization: {0}")]
    Signing(#[from] alloy_signer::Error),
    /// The payload could not be serialized for the header.
    #[error("failed to encode payment header: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Builds and signs a payload satisfying `requirement`.
///
/// The authorization is valid immediately (`validAfter = 0`) and expires
/// `maxTimeoutSeconds` from now. Every call draws a fresh random nonce.
///
/// # Errors
///
/// Returns [`SignError::Signing`] if the signer fails.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(
        skip_all,
        fields(network = %requirement.network, pay_to = %requirement.pay_to),
        err
    )
)]
pub async fn sign_payment<S: SignerLike>(
    signer: &S,
    requirement: &PaymentRequirement,
) -> Result<PaymentPayload, SignError> {
    let now = UnixTimestamp::now();
    let nonce: [u8; 32] = rng().random();

    let authorization = Authorization {
        from: signer.address(),
        to: requirement.pay_to,
        value: requirement.max_amount_required,
        valid_after: UnixTimestamp::EPOCH,
        valid_before: now + requirement.max_timeout_seconds,
        nonce: B256::from(nonce),
    };

    let hash = signing_hash(
        &authorization,
        requirement.network,
        requirement.relayer_contract,
    );
    let signature = signer.sign_hash(&hash).await?;

    Ok(PaymentPayload {
        protocol_version: V1,
        scheme: ExactScheme,
        network: requirement.network,
        token: requirement.asset,
        payload: ExactPayload {
            signature: signature.as_bytes().into(),
            authorization,
        },
    })
}

/// A payer that signs b402 payloads with one key.
#[derive(Debug, Clone)]
pub struct B402EvmClient<S> {
    signer: S,
}

impl<S> B402EvmClient<S> {
    /// Creates a client around `signer`.
    pub const fn new(signer: S) -> Self {
        Self { signer }
    }
}

impl<S: SignerLike> B402EvmClient<S> {
    /// Address that will appear as `authorization.from`.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs a payload for `requirement`.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] if signing fails.
    pub async fn sign(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<PaymentPayload, SignError> {
        sign_payment(&self.signer, requirement).await
    }

    /// Signs a payload and encodes it as an `X-PAYMENT` header value.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] if signing or encoding fails.
    pub async fn payment_header(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<String, SignError> {
        let payload = self.sign(requirement).await?;
        Ok(encode_json(&payload)?)
    }
}
