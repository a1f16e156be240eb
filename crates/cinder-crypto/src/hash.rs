use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte BLAKE3 digest used for network ids, node ids, asset ids and
/// transaction payload hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Bind an identity hash to a specific network:
    /// `BLAKE3(self ‖ network_id)`. Node ids are always network-scoped so
    /// the same signing key yields unrelated ids on different networks.
    pub fn for_network(&self, network_id: &Hash32) -> Hash32 {
        let mut input = [0u8; 64];
        input[..32].copy_from_slice(&self.0);
        input[32..].copy_from_slice(&network_id.0);
        blake3_hash(&input)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({}…)", &self.to_hex()[..16])
    }
}

/// BLAKE3 of arbitrary bytes → `Hash32`.
pub fn blake3_hash(data: &[u8]) -> Hash32 {
    Hash32(*blake3::hash(data).as_bytes())
}

/// BLAKE3 XOF of arbitrary bytes → 64 bytes, used wherever a wide seed is
/// needed (scalar reduction, key derivation).
pub fn blake3_hash_wide(data: &[u8]) -> [u8; 64] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut out = [0u8; 64];
    hasher.finalize_xof().fill(&mut out);
    out
}
