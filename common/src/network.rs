use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    config::{
        DEVNET_PREFIX_ADDRESS, PREFIX_ADDRESS, STAKE_MIN_AGE, STAKE_MIN_DEPTH,
        TESTNET_PREFIX_ADDRESS,
    },
    time::TimestampSeconds,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Self::Mainnet)
    }

    pub fn address_prefix(&self) -> &'static str {
        match self {
            Self::Mainnet => PREFIX_ADDRESS,
            Self::Testnet => TESTNET_PREFIX_ADDRESS,
            Self::Devnet => DEVNET_PREFIX_ADDRESS,
        }
    }

    pub fn from_address_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            PREFIX_ADDRESS => Some(Self::Mainnet),
            TESTNET_PREFIX_ADDRESS => Some(Self::Testnet),
            DEVNET_PREFIX_ADDRESS => Some(Self::Devnet),
            _ => None,
        }
    }

    // Devnet allows staking freshly created outputs so a local chain can progress
    pub fn stake_min_age(&self) -> TimestampSeconds {
        match self {
            Self::Mainnet | Self::Testnet => STAKE_MIN_AGE,
            Self::Devnet => 0,
        }
    }

    pub fn stake_min_depth(&self) -> u64 {
        match self {
            Self::Mainnet | Self::Testnet => STAKE_MIN_DEPTH,
            Self::Devnet => 1,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            _ => Err(format!("Invalid network: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_distinct() {
        for network in [Network::Mainnet, Network::Testnet, Network::Devnet] {
            assert_eq!(
                Network::from_address_prefix(network.address_prefix()),
                Some(network)
            );
            assert_eq!(network.to_string().parse::<Network>(), Ok(network));
        }
    }

    #[test]
    fn test_devnet_has_no_min_age() {
        assert_eq!(Network::Devnet.stake_min_age(), 0);
        assert_eq!(Network::Mainnet.stake_min_age(), STAKE_MIN_AGE);
        assert_eq!(Network::Testnet.stake_min_depth(), STAKE_MIN_DEPTH);
    }
}
