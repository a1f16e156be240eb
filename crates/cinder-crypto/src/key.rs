//! Curve25519 key material.
//!
//! A `Key` is 32 bytes that are either a scalar (private) or a compressed
//! Edwards point (public); which one is determined by how the key was
//! produced. Private keys only ever come from `Key::from_seed`, which
//! performs a wide scalar reduction, so every private key is canonical.
//!
//! Ghost public keys follow the one-time-output scheme: for a transaction
//! secret `r` and a recipient with view key `A` and spend key `B`, the
//! destination key is `H_s(r·A)·G + B`. Only the holder of the private view
//! key can detect the output and only the holder of the private spend key
//! can spend it.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::hash::blake3_hash_wide;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid curve point {0}")]
    InvalidPoint(String),
}

/// A 32-byte curve25519 key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Key(pub [u8; 32]);

impl Key {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a private key from a 64-byte seed by wide scalar reduction.
    /// The same seed always yields the same key on every node.
    pub fn from_seed(seed: &[u8; 64]) -> Self {
        Self(Scalar::from_bytes_mod_order_wide(seed).to_bytes())
    }

    /// The public form of a private key: `self·G`, compressed.
    pub fn public(&self) -> Key {
        let s = Scalar::from_bytes_mod_order(self.0);
        Key((s * ED25519_BASEPOINT_POINT).compress().to_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }

    fn point(&self) -> Result<EdwardsPoint, KeyError> {
        CompressedEdwardsY(self.0)
            .decompress()
            .ok_or_else(|| KeyError::InvalidPoint(self.to_hex()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}…)", &self.to_hex()[..16])
    }
}

/// Hash arbitrary bytes to a canonical scalar (wide reduction of the
/// BLAKE3 XOF output).
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&blake3_hash_wide(data))
}

/// One-time destination key: `H_s(r·A)·G + B` for transaction secret `r`,
/// recipient view key `A` and spend key `B`.
pub fn derive_ghost_public_key(r: &Key, view: &Key, spend: &Key) -> Result<Key, KeyError> {
    let shared = r.scalar() * view.point()?;
    let h = hash_to_scalar(shared.compress().as_bytes());
    let ghost = h * ED25519_BASEPOINT_POINT + spend.point()?;
    Ok(Key(ghost.compress().to_bytes()))
}

/// Schnorr signature over the Edwards curve: `(R, s)` with a deterministic
/// nonce so signing never consumes external randomness.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::invalid_length(bytes.len(), &"64 bytes"));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", &hex::encode(&self.0[..8]))
    }
}

fn challenge(r_point: &[u8; 32], public: &Key, message: &[u8]) -> Scalar {
    let mut input = Vec::with_capacity(64 + message.len());
    input.extend_from_slice(r_point);
    input.extend_from_slice(&public.0);
    input.extend_from_slice(message);
    hash_to_scalar(&input)
}

/// Sign `message` with the private key. The nonce is derived from the key
/// and the message, so the signature is fully deterministic.
pub fn sign(private: &Key, message: &[u8]) -> Signature {
    let public = private.public();
    let mut nonce_input = Vec::with_capacity(32 + message.len());
    nonce_input.extend_from_slice(&private.0);
    nonce_input.extend_from_slice(message);
    let r = hash_to_scalar(&nonce_input);
    let r_point = (r * ED25519_BASEPOINT_POINT).compress().to_bytes();
    let e = challenge(&r_point, &public, message);
    let s = r + e * private.scalar();

    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&r_point);
    out[32..].copy_from_slice(&s.to_bytes());
    Signature(out)
}

/// Verify a signature against a public key: `s·G == R + e·P`.
pub fn verify(public: &Key, message: &[u8], sig: &Signature) -> bool {
    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&sig.0[..32]);
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&sig.0[32..]);

    let r_point = match CompressedEdwardsY(r_bytes).decompress() {
        Some(p) => p,
        None => return false,
    };
    let p_point = match CompressedEdwardsY(public.0).decompress() {
        Some(p) => p,
        None => return false,
    };
    let s = match Option::<Scalar>::from(Scalar::from_canonical_bytes(s_bytes)) {
        Some(s) => s,
        None => return false,
    };

    let e = challenge(&r_bytes, public, message);
    s * ED25519_BASEPOINT_POINT == r_point + e * p_point
}
