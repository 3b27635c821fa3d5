//! BNB Chain networks understood by the b402 protocol.
//!
//! b402 identifies networks by short names (`"bsc"`, `"bsc-testnet"`) on the
//! wire. The EIP-155 chain id that goes into the EIP-712 signing domain is
//! derived from the name; it is never sent separately.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// BNB Smart Chain mainnet chain id.
pub const BSC_MAINNET: u64 = 56;

/// BNB Smart Chain testnet chain id.
pub const BSC_TESTNET: u64 = 97;

/// Binance-Peg BSC-USD (USDT) on BNB Smart Chain mainnet.
pub const USDT_BSC: Address = address!("55d398326f99059fF775485246999027B3197955");

/// USDT test token on BNB Smart Chain testnet.
pub const USDT_BSC_TESTNET: Address = address!("337610d27c682E347C9cD60BD4b3b107C9d34dDd");

/// Decimals of the default USDT deployments on both networks.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// A network a b402 payment can settle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// BNB Smart Chain mainnet.
    #[serde(rename = "bsc")]
    Bsc,
    /// BNB Smart Chain testnet.
    #[serde(rename = "bsc-testnet")]
    BscTestnet,
}

/// Returned when a network name is not one of the supported networks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported network {0:?}, expected \"bsc\" or \"bsc-testnet\"")]
pub struct UnknownNetwork(pub String);

impl Network {
    /// All supported networks.
    pub const ALL: [Self; 2] = [Self::Bsc, Self::BscTestnet];

    /// Wire name of the network.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bsc => "bsc",
            Self::BscTestnet => "bsc-testnet",
        }
    }

    /// EIP-155 chain id used in the signing domain.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        match self {
            Self::Bsc => BSC_MAINNET,
            Self::BscTestnet => BSC_TESTNET,
        }
    }

    /// Default stablecoin accepted on this network.
    #[must_use]
    pub const fn default_token(&self) -> Address {
        match self {
            Self::Bsc => USDT_BSC,
            Self::BscTestnet => USDT_BSC_TESTNET,
        }
    }

    /// Looks a network up by its EIP-155 chain id.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bsc" | "bsc-mainnet" => Ok(Self::Bsc),
            "bsc-testnet" => Ok(Self::BscTestnet),
            _ => Err(UnknownNetwork(s.to_owned())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_wire_names() {
        assert_eq!(serde_json::to_string(&Network::Bsc).unwrap(), "\"bsc\"");
        assert_eq!(
            serde_json::to_string(&Network::BscTestnet).unwrap(),
            "\"bsc-testnet\""
        );
        let parsed: Network = serde_json::from_str("\"bsc-testnet\"").unwrap();
        assert_eq!(parsed, Network::BscTestnet);
    }

    #[test]
    fn test_network_rejects_foreign_chains() {
        let result: Result<Network, _> = serde_json::from_str("\"base-sepolia\"");
        assert!(result.is_err());
        assert!("ethereum".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_chain_ids() {
        assert_eq!(Network::Bsc.chain_id(), 56);
        assert_eq!(Network::BscTestnet.chain_id(), 97);
        assert_eq!(Network::from_chain_id(97), Some(Network::BscTestnet));
        assert_eq!(Network::from_chain_id(1), None);
    }

    #[test]
    fn test_network_from_str_is_case_insensitive() {
        assert_eq!("BSC".parse::<Network>().unwrap(), Network::Bsc);
        assert_eq!(" bsc-testnet ".parse::<Network>().unwrap(), Network::BscTestnet);
    }
}
