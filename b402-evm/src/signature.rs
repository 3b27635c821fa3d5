//! Signer recovery for b402 payloads.
//!
//! Only plain 65-byte EOA signatures are accepted. The recovered address is
//! compared with `authorization.from`; a mismatch means the payload was
//! either tampered with or signed for another chain or relayer.

use alloy_primitives::{Address, Signature};
use b402::{PaymentPayload, PaymentRequirement, VerificationError};

use crate::types::signing_hash;

/// Recovers the address that signed `payload` for `requirement`.
///
/// The signing domain is taken from the requirement (its network and relayer
/// contract), not from the payload, so a payload signed for another chain
/// recovers to an unrelated address.
///
/// # Errors
///
/// Returns [`VerificationError::InvalidSignature`] when the signature bytes
/// are not a well-formed secp256k1 signature or recovery fails.
pub fn recover_payer(
    requirement: &PaymentRequirement,
    payload: &PaymentPayload,
) -> Result<Address, VerificationError> {
    let exact = &payload.payload;
    let signature = Signature::from_raw(&exact.signature)
        .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
    let hash = signing_hash(
        &exact.authorization,
        requirement.network,
        requirement.relayer_contract,
    );
    signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| VerificationError::InvalidSignature(e.to_string()))
}

/// Checks that `payload` was signed by its declared payer.
///
/// # Errors
///
/// Returns [`VerificationError::InvalidSignature`] if recovery fails or the
/// recovered address differs from `authorization.from`.
#[cfg_attr(
    feature = "telemetry",
    tracing::instrument(skip_all, fields(payer = %payload.payer()), err)
)]
pub fn verify_payer(
    requirement: &PaymentRequirement,
    payload: &PaymentPayload,
) -> Result<Address, VerificationError> {
    let recovered = recover_payer(requirement, payload)?;
    if recovered == payload.payer() {
        Ok(recovered)
    } else {
        Err(VerificationError::InvalidSignature(format!(
            "recovered signer {recovered} does not match authorization.from {}",
            payload.payer()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, Bytes};
    use alloy_signer_local::PrivateKeySigner;
    use b402::{
        Authorization, ExactPayload, ExactScheme, Network, TokenAmount, UnixTimestamp, proto::V1,
    };

    fn requirement(relayer: Address) -> PaymentRequirement {
        PaymentRequirement::new(
            Network::BscTestnet,
            Network::BscTestnet.default_token(),
            Address::repeat_byte(0x22),
            TokenAmount::from(1_000u128),
            relayer,
        )
    }

    async fn signed_payload(
        signer: &PrivateKeySigner,
        requirement: &PaymentRequirement,
    ) -> PaymentPayload {
        let authorization = Authorization {
            from: signer.address(),
            to: requirement.pay_to,
            value: requirement.max_amount_required,
            valid_after: UnixTimestamp::EPOCH,
            valid_before: UnixTimestamp::from_secs(4_000_000_000),
            nonce: B256::repeat_byte(0x33),
        };
        let hash = signing_hash(
            &authorization,
            requirement.network,
            requirement.relayer_contract,
        );
        let signature = alloy_signer::Signer::sign_hash(signer, &hash).await.unwrap();
        PaymentPayload {
            protocol_version: V1,
            scheme: ExactScheme,
            network: requirement.network,
            token: requirement.asset,
            payload: ExactPayload {
                signature: Bytes::from(signature.as_bytes().to_vec()),
                authorization,
            },
        }
    }

    #[tokio::test]
    async fn test_verify_payer_accepts_genuine_signature() {
        let signer = PrivateKeySigner::random();
        let req = requirement(Address::repeat_byte(0x44));
        let payload = signed_payload(&signer, &req).await;
        assert_eq!(verify_payer(&req, &payload), Ok(signer.address()));
    }

    #[tokio::test]
    async fn test_verify_payer_rejects_tampered_value() {
        let signer = PrivateKeySigner::random();
        let req = requirement(Address::repeat_byte(0x44));
        let mut payload = signed_payload(&signer, &req).await;
        payload.payload.authorization.value = TokenAmount::from(1u128);
        assert!(matches!(
            verify_payer(&req, &payload),
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_payer_rejects_other_relayer() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer, &requirement(Address::repeat_byte(0x44))).await;
        let other = requirement(Address::repeat_byte(0x45));
        assert!(verify_payer(&other, &payload).is_err());
    }

    #[tokio::test]
    async fn test_recover_rejects_garbage_bytes() {
        let signer = PrivateKeySigner::random();
        let req = requirement(Address::repeat_byte(0x44));
        let mut payload = signed_payload(&signer, &req).await;
        payload.payload.signature = Bytes::from_static(&[0u8; 10]);
        assert!(matches!(
            recover_payer(&req, &payload),
            Err(VerificationError::InvalidSignature(_))
        ));
    }
}
