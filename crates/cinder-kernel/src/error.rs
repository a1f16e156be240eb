use cinder_core::CinderError;
use cinder_crypto::KeyError;
use cinder_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    // ── Genesis ──────────────────────────────────────────────────────────────
    #[error("invalid genesis inputs number {got}/{want}")]
    InvalidGenesisNodeCount { got: usize, want: usize },

    #[error("invalid genesis input amount {0}")]
    InvalidGenesisBalance(String),

    #[error("duplicated genesis inputs {0}")]
    DuplicatedGenesisInput(String),

    #[error("invalid node key format {derived} {declared}")]
    InvalidNodeKey { derived: String, declared: String },

    #[error("invalid genesis epoch {0}")]
    InvalidGenesisEpoch(i64),

    #[error("invalid genesis for network {0}")]
    NetworkMismatch(String),

    #[error("reading genesis file {path}: {reason}")]
    GenesisFile { path: String, reason: String },

    #[error("encoding genesis declaration: {0}")]
    GenesisEncoding(String),

    // ── Mint ─────────────────────────────────────────────────────────────────
    /// Transient: prior-day statistics are not aggregated yet. The mint loop
    /// retries on the next tick.
    #[error("mint distribution not ready yet: {0}")]
    NotReady(String),

    #[error("no {group} mint available at {timestamp}")]
    NoMintAvailable {
        group: &'static str,
        timestamp: u64,
    },

    #[error("no domain account registered for the custodian output")]
    MissingDomain,

    #[error("malformed mint transaction at {timestamp} {theirs} {ours}")]
    MalformedMintTransaction {
        timestamp: u64,
        theirs: String,
        ours: String,
    },

    // ── Pass-through ─────────────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CinderError),

    #[error(transparent)]
    Key(#[from] KeyError),
}
