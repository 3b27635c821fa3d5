//! Typed-data definitions for the b402 "exact" scheme.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};
use b402::{Authorization, Network};

/// EIP-712 domain name shared by all b402 deployments.
pub const B402_DOMAIN_NAME: &str = "B402";

/// EIP-712 domain version.
pub const B402_DOMAIN_VERSION: &str = "1";

sol!(
    /// EIP-3009 `TransferWithAuthorization` as it appears in EIP-712 typed data.
    ///
    /// Field order and types must match the relayer contract exactly; the
    /// verifier rebuilds this struct from the wire [`Authorization`] to
    /// check the signature.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

impl From<&Authorization> for TransferWithAuthorization {
    fn from(authorization: &Authorization) -> Self {
        Self {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value.into(),
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        }
    }
}

/// Builds the b402 signing domain for a network and relayer contract.
#[must_use]
pub fn b402_domain(network: Network, relayer_contract: Address) -> Eip712Domain {
    eip712_domain! {
        name: B402_DOMAIN_NAME,
        version: B402_DOMAIN_VERSION,
        chain_id: network.chain_id(),
        verifying_contract: relayer_contract,
    }
}

/// EIP-712 digest a payer signs for `authorization`.
#[must_use]
pub fn signing_hash(
    authorization: &Authorization,
    network: Network,
    relayer_contract: Address,
) -> B256 {
    TransferWithAuthorization::from(authorization)
        .eip712_signing_hash(&b402_domain(network, relayer_contract))
}

#[cfg(test)]
mod tests {
    use super::*;
    use b402::{TokenAmount, UnixTimestamp};

    fn authorization() -> Authorization {
        Authorization {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x02),
            value: TokenAmount::from(10_000_000_000_000_000u128),
            valid_after: UnixTimestamp::EPOCH,
            valid_before: UnixTimestamp::from_secs(1_700_000_600),
            nonce: B256::repeat_byte(0x07),
        }
    }

    #[test]
    fn test_domain_fields() {
        let relayer = Address::repeat_byte(0x0a);
        let domain = b402_domain(Network::BscTestnet, relayer);
        assert_eq!(domain.name.as_deref(), Some("B402"));
        assert_eq!(domain.version.as_deref(), Some("1"));
        assert_eq!(domain.chain_id, Some(U256::from(97u64)));
        assert_eq!(domain.verifying_contract, Some(relayer));
    }

    #[test]
    fn test_signing_hash_binds_chain_and_relayer() {
        let relayer = Address::repeat_byte(0x0a);
        let auth = authorization();
        let testnet = signing_hash(&auth, Network::BscTestnet, relayer);
        assert_ne!(testnet, signing_hash(&auth, Network::Bsc, relayer));
        assert_ne!(
            testnet,
            signing_hash(&auth, Network::BscTestnet, Address::repeat_byte(0x0b))
        );
        assert_eq!(testnet, signing_hash(&auth, Network::BscTestnet, relayer));
    }

    #[test]
    fn test_struct_mirrors_authorization() {
        let auth = authorization();
        let typed = TransferWithAuthorization::from(&auth);
        assert_eq!(typed.from, auth.from);
        assert_eq!(typed.value, U256::from(10_000_000_000_000_000u128));
        assert_eq!(typed.validBefore, U256::from(1_700_000_600u64));
        assert_eq!(typed.nonce, auth.nonce);
    }
}
