//! Cinder addresses: a public spend key plus a public view key.
//!
//! View keys are not independent secrets — they are derived from the spend
//! key by hashing (`Key::from_seed(H(spend) ‖ H(spend))`), which lets any
//! node reconstruct the view key and reject declarations that break the
//! rule. The string form is `CDR` + base58(spend ‖ view ‖ checksum).

use cinder_crypto::{blake3_hash, Hash32, Key};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CinderError;

pub const ADDRESS_PREFIX: &str = "CDR";

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub public_spend_key: Key,
    pub public_view_key: Key,
}

impl Address {
    pub fn new(public_spend_key: Key, public_view_key: Key) -> Self {
        Self {
            public_spend_key,
            public_view_key,
        }
    }

    /// The deterministic view key for a given public spend key.
    pub fn view_key_for_spend(spend: &Key) -> Key {
        let h = blake3_hash(spend.as_bytes());
        let mut seed = [0u8; 64];
        seed[..32].copy_from_slice(h.as_bytes());
        seed[32..].copy_from_slice(h.as_bytes());
        Key::from_seed(&seed).public()
    }

    /// Address controlled by the private spend key, with the view key
    /// derived by the network rule.
    pub fn from_spend_private(spend_private: &Key) -> Self {
        let spend = spend_private.public();
        let view = Self::view_key_for_spend(&spend);
        Self::new(spend, view)
    }

    /// The synthetic address for a fixed 64-byte seed. Used with the
    /// all-zeros seed for the light-pool outputs everyone can recompute.
    pub fn from_seed(seed: &[u8; 64]) -> Self {
        Self::from_spend_private(&Key::from_seed(seed))
    }

    /// Whether the view key matches the derivation rule.
    pub fn has_derived_view_key(&self) -> bool {
        Self::view_key_for_spend(&self.public_spend_key) == self.public_view_key
    }

    /// Identity hash of this address: `BLAKE3(spend ‖ view)`. Scope it with
    /// [`Hash32::for_network`] to obtain a node id.
    pub fn hash(&self) -> Hash32 {
        let mut input = [0u8; 64];
        input[..32].copy_from_slice(self.public_spend_key.as_bytes());
        input[32..].copy_from_slice(self.public_view_key.as_bytes());
        blake3_hash(&input)
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let mut input = Vec::with_capacity(ADDRESS_PREFIX.len() + payload.len());
        input.extend_from_slice(ADDRESS_PREFIX.as_bytes());
        input.extend_from_slice(payload);
        let h = blake3_hash(&input);
        let mut out = [0u8; 4];
        out.copy_from_slice(&h.as_bytes()[..4]);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(68);
        payload.extend_from_slice(self.public_spend_key.as_bytes());
        payload.extend_from_slice(self.public_view_key.as_bytes());
        let checksum = Self::checksum(&payload);
        payload.extend_from_slice(&checksum);
        write!(f, "{}{}", ADDRESS_PREFIX, bs58::encode(payload).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_string();
        write!(f, "Address({}…)", &s[..12.min(s.len())])
    }
}

impl FromStr for Address {
    type Err = CinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| CinderError::InvalidAddress(s.to_string()))?;
        let payload = bs58::decode(body)
            .into_vec()
            .map_err(|_| CinderError::InvalidAddress(s.to_string()))?;
        if payload.len() != 68 {
            return Err(CinderError::InvalidAddress(s.to_string()));
        }
        let checksum = Self::checksum(&payload[..64]);
        if payload[64..] != checksum {
            return Err(CinderError::InvalidAddress(s.to_string()));
        }
        let mut spend = [0u8; 32];
        spend.copy_from_slice(&payload[..32]);
        let mut view = [0u8; 32];
        view.copy_from_slice(&payload[32..64]);
        Ok(Self::new(Key::from_bytes(spend), Key::from_bytes(view)))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address(label: &str) -> Address {
        let h = blake3_hash(label.as_bytes());
        let mut seed = [0u8; 64];
        seed[..32].copy_from_slice(h.as_bytes());
        seed[32..].copy_from_slice(h.as_bytes());
        Address::from_seed(&seed)
    }

    #[test]
    fn string_round_trip() {
        let addr = test_address("node-1");
        let s = addr.to_string();
        assert!(s.starts_with("CDR"));
        let back: Address = s.parse().unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn corrupted_string_is_rejected() {
        let mut s = test_address("node-1").to_string();
        let replacement = if s.ends_with('2') { '3' } else { '2' };
        s.pop();
        s.push(replacement);
        assert!(s.parse::<Address>().is_err());
        assert!("XIN123".parse::<Address>().is_err());
    }

    #[test]
    fn derived_view_key_holds_for_seed_addresses() {
        let addr = test_address("node-2");
        assert!(addr.has_derived_view_key());

        let broken = Address::new(addr.public_spend_key, addr.public_spend_key);
        assert!(!broken.has_derived_view_key());
    }

    #[test]
    fn zero_seed_address_is_stable() {
        let a = Address::from_seed(&[0u8; 64]);
        let b = Address::from_seed(&[0u8; 64]);
        assert_eq!(a, b);
        assert!(a.has_derived_view_key());
    }

    #[test]
    fn json_codec_uses_string_form() {
        let addr = test_address("node-3");
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
