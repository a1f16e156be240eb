use cinder_crypto::KeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CinderError {
    // ── Amounts ──────────────────────────────────────────────────────────────
    #[error("invalid amount {0}")]
    InvalidAmount(String),

    // ── Addresses ────────────────────────────────────────────────────────────
    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    // ── Transactions ─────────────────────────────────────────────────────────
    #[error("transaction has no inputs")]
    MissingInputs,

    #[error("invalid script {0}")]
    InvalidScript(String),

    #[error("signature index {index} out of range for {inputs} inputs")]
    SignatureIndexOutOfRange { index: usize, inputs: usize },

    #[error("mint outputs {total} do not match mint input {amount}")]
    MintTotalMismatch { total: String, amount: String },

    #[error("malformed transaction encoding: {0}")]
    Encoding(String),
}
