/// ─── Cinder Protocol Constants ──────────────────────────────────────────────
///
/// Native asset: CDR. All amounts are whole CDR units; issuance arithmetic
/// uses floor division throughout so every node computes identical values.
use cinder_crypto::{blake3_hash, Hash32};

// ── Mint pool ────────────────────────────────────────────────────────────────

/// Total issuable reserve at genesis (CDR).
pub const MINT_POOL: u64 = 500_000;

/// Circulating-supply accumulator seed, used only for pledge sizing (CDR).
pub const MINT_LIQUIDITY: u64 = 500_000;

/// Each year reserves 1/10 of the remaining pool as the annual budget.
pub const MINT_YEAR_SHARES: u64 = 10;

/// Mint batches (days) per protocol year.
pub const MINT_YEAR_BATCHES: u64 = 365;

/// Divisor for pledge sizing: the network never admits more nodes than this.
pub const MINT_NODE_MAXIMUM: u64 = 50;

// ── Consensus-node set ───────────────────────────────────────────────────────

/// Pledge locked by every consensus node (CDR).
pub const PLEDGE_AMOUNT: u64 = 10_000;

/// The genesis declaration must list exactly this many nodes.
pub const MINIMUM_NODE_COUNT: usize = 7;

// ── Mainnet fork batches ─────────────────────────────────────────────────────

/// Before this batch the mainnet mint window was pinned to [6, 18].
pub const MAINNET_MINT_PERIOD_FORK_BATCH: u64 = 72;
pub const MAINNET_MINT_PERIOD_FORK_TIME_BEGIN: u64 = 6;
pub const MAINNET_MINT_PERIOD_FORK_TIME_END: u64 = 18;

/// First batch distributed by the clamped-average work scheme.
pub const MAINNET_MINT_WORK_DISTRIBUTION_FORK_BATCH: u64 = 729;

/// First batch encoded with the v2 transaction format; earlier mainnet
/// batches are historical and cannot be rebuilt by this kernel.
pub const MAINNET_MINT_TRANSACTION_V2_FORK_BATCH: u64 = 739;

/// First batch of the universal mint era; crossing it triggers the one-shot
/// legacy light-pool slash.
pub const MAINNET_MINT_TRANSACTION_V3_FORK_BATCH: u64 = 1313;

// ── Encoding versions ────────────────────────────────────────────────────────

pub const TX_VERSION: u8 = 3;
pub const SNAPSHOT_VERSION: u8 = 2;

// ── Output script opcodes ────────────────────────────────────────────────────

pub const OPERATOR_CMP: u8 = 0xba;
pub const OPERATOR_SUM: u8 = 0xbb;

/// Threshold value reserving an output for the light-node pool.
pub const OPERATOR_64: u8 = 64;

// ── Time ─────────────────────────────────────────────────────────────────────

pub const NS_PER_HOUR: u64 = 3_600_000_000_000;
pub const NS_PER_DAY: u64 = 24 * NS_PER_HOUR;

// ── Networks ─────────────────────────────────────────────────────────────────

pub const NETWORK_MAINNET: &str = "mainnet";

/// Identifier of the native asset.
pub fn native_asset_id() -> Hash32 {
    blake3_hash(b"cinder/asset/CDR")
}
