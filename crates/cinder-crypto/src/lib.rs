pub mod hash;
pub mod key;

pub use hash::{blake3_hash, Hash32};
pub use key::{derive_ghost_public_key, sign, verify, Key, KeyError, Signature};
