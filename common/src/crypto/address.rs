use std::{fmt, str::FromStr};

use serde::{de::Error as SerdeError, Deserialize, Serialize};

use super::{hash_with_domain, CryptoError, KeyId};
use crate::{config::KEY_ID_SIZE, network::Network};

// Separator between the network prefix and the payload
const SEPARATOR: char = '1';
const CHECKSUM_SIZE: usize = 4;
const CHECKSUM_DOMAIN: &[u8] = b"POS-ADDRESS-CHECKSUM-v1";

/// Human readable form of a key id, bound to a network.
///
/// Format: `<prefix>1<hex(key_id || checksum)>` where the checksum is the
/// first 4 bytes of a domain separated hash over the prefix and key id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    network: Network,
    key_id: KeyId,
}

impl Address {
    pub fn new(network: Network, key_id: KeyId) -> Self {
        Self { network, key_id }
    }

    pub fn get_network(&self) -> Network {
        self.network
    }

    pub fn get_key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn is_mainnet(&self) -> bool {
        self.network.is_mainnet()
    }

    fn checksum(network: Network, key_id: &KeyId) -> [u8; CHECKSUM_SIZE] {
        let digest = hash_with_domain(
            CHECKSUM_DOMAIN,
            &[network.address_prefix().as_bytes(), key_id.as_bytes()],
        );
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&digest.as_bytes()[..CHECKSUM_SIZE]);
        checksum
    }

    pub fn as_string(&self) -> String {
        let mut payload = Vec::with_capacity(KEY_ID_SIZE + CHECKSUM_SIZE);
        payload.extend_from_slice(self.key_id.as_bytes());
        payload.extend_from_slice(&Self::checksum(self.network, &self.key_id));
        format!(
            "{}{}{}",
            self.network.address_prefix(),
            SEPARATOR,
            hex::encode(payload)
        )
    }

    /// Parse an address and require it to belong to `network`.
    pub fn from_string_for(value: &str, network: Network) -> Result<Self, CryptoError> {
        let address = Self::from_string(value)?;
        if address.network != network {
            return Err(CryptoError::InvalidAddress(format!(
                "address is for {}, expected {}",
                address.network, network
            )));
        }
        Ok(address)
    }

    pub fn from_string(value: &str) -> Result<Self, CryptoError> {
        let (prefix, payload) = value
            .split_once(SEPARATOR)
            .ok_or_else(|| CryptoError::InvalidAddress("missing separator".to_owned()))?;

        let network = Network::from_address_prefix(prefix)
            .ok_or_else(|| CryptoError::InvalidAddress(format!("unknown prefix {}", prefix)))?;

        let bytes = hex::decode(payload).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        if bytes.len() != KEY_ID_SIZE + CHECKSUM_SIZE {
            return Err(CryptoError::InvalidAddress(format!(
                "invalid payload length {}",
                bytes.len()
            )));
        }

        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&bytes[..KEY_ID_SIZE]);
        let key_id = KeyId::new(id);

        if bytes[KEY_ID_SIZE..] != Self::checksum(network, &key_id) {
            return Err(CryptoError::InvalidChecksum);
        }

        Ok(Self { network, key_id })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_string(&s).map_err(SerdeError::custom)
    }
}
