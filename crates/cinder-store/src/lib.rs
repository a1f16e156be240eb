//! Storage interface consumed by the Cinder kernel.
//!
//! The kernel never touches a database directly: everything goes through
//! the [`Store`] trait so the mint and genesis paths can be driven against
//! the in-memory fake in tests and against sled in production. Writes that
//! can lose a transactional race surface [`StoreError::Conflict`], which is
//! the only error the aggregation loop retries.

pub mod memory;
pub mod sled_store;

use std::collections::HashMap;

use cinder_core::{
    CustodianUpdateRequest, Domain, Hash32, MintDistribution, RoundSpace, SnapshotWork,
    SnapshotWithTopologicalOrder, VersionedTransaction,
};
use thiserror::Error;

pub use memory::MemStore;
pub use sled_store::SledStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A transactional race was lost; the caller may retry the write.
    #[error("storage conflict")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Daily work statistic per node: `[produced, signed]`.
pub type NodeWork = [u64; 2];

pub trait Store: Send + Sync {
    // ── Custodian ────────────────────────────────────────────────────────────

    /// Latest accepted custodian rotation at or before `timestamp`.
    fn read_custodian(&self, timestamp: u64) -> Result<Option<CustodianUpdateRequest>, StoreError>;

    fn write_custodian(&self, request: &CustodianUpdateRequest) -> Result<(), StoreError>;

    // ── Mint distributions ───────────────────────────────────────────────────

    /// Latest distribution with `batch <= batch_upper_bound`.
    fn read_last_mint_distribution(
        &self,
        batch_upper_bound: u64,
    ) -> Result<Option<MintDistribution>, StoreError>;

    /// Distributions starting at `batch`, ascending, at most `limit`.
    fn read_mint_distributions(
        &self,
        batch: u64,
        limit: usize,
    ) -> Result<Vec<MintDistribution>, StoreError>;

    fn write_mint_distribution(&self, dist: &MintDistribution) -> Result<(), StoreError>;

    // ── Work statistics ──────────────────────────────────────────────────────

    fn list_node_works(
        &self,
        node_ids: &[Hash32],
        day: u32,
    ) -> Result<HashMap<Hash32, NodeWork>, StoreError>;

    fn write_node_work(&self, node_id: &Hash32, day: u32, work: NodeWork)
        -> Result<(), StoreError>;

    // ── Round spaces ─────────────────────────────────────────────────────────

    fn read_node_round_spaces_for_batch(
        &self,
        node_id: &Hash32,
        batch: u64,
    ) -> Result<Vec<RoundSpace>, StoreError>;

    fn write_round_space(&self, space: &RoundSpace) -> Result<(), StoreError>;

    /// The highest-batch checkpoint per requested node.
    fn list_aggregated_round_space_checkpoints(
        &self,
        node_ids: &[Hash32],
    ) -> Result<Vec<RoundSpace>, StoreError>;

    // ── Work aggregation ─────────────────────────────────────────────────────

    /// Next round the aggregation loop should process for `chain_id`.
    fn read_work_offset(&self, chain_id: &Hash32) -> Result<u64, StoreError>;

    fn read_snapshot_works_for_node_round(
        &self,
        chain_id: &Hash32,
        round: u64,
    ) -> Result<Vec<SnapshotWork>, StoreError>;

    /// Queue raw snapshot works for a round (written by the consensus layer).
    fn write_snapshot_works(
        &self,
        chain_id: &Hash32,
        round: u64,
        works: &[SnapshotWork],
    ) -> Result<(), StoreError>;

    /// Fold a round's snapshot works into daily per-node statistics and
    /// advance the chain's work offset. Losing a race returns
    /// [`StoreError::Conflict`]; the caller retries.
    fn write_round_work(
        &self,
        chain_id: &Hash32,
        round: u64,
        snapshots: &[SnapshotWork],
    ) -> Result<(), StoreError>;

    // ── Transactions and snapshots ───────────────────────────────────────────

    fn cache_put_transaction(&self, tx: &VersionedTransaction) -> Result<(), StoreError>;

    fn cache_get_transaction(
        &self,
        hash: &Hash32,
    ) -> Result<Option<VersionedTransaction>, StoreError>;

    /// One-shot write of the genesis snapshots. Idempotent on re-boot.
    fn snapshots_load_genesis(
        &self,
        snapshots: &[SnapshotWithTopologicalOrder],
    ) -> Result<(), StoreError>;

    fn read_genesis_snapshots(&self) -> Result<Vec<SnapshotWithTopologicalOrder>, StoreError>;

    // ── Node state ───────────────────────────────────────────────────────────

    fn state_get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn state_set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    // ── Domains ──────────────────────────────────────────────────────────────

    fn read_domains(&self) -> Result<Vec<Domain>, StoreError>;

    fn write_domain(&self, domain: &Domain) -> Result<(), StoreError>;
}

/// Fold one round of snapshot works into per-day increments, shared by both
/// store backends so they aggregate identically.
///
/// The chain's own node earns one produced count per snapshot; every other
/// signer earns one signed count. Returns `((node_id, day), [produced,
/// signed])` increments.
pub(crate) fn round_work_increments(
    chain_id: &Hash32,
    snapshots: &[SnapshotWork],
) -> Vec<((Hash32, u32), NodeWork)> {
    use cinder_core::NS_PER_DAY;

    let mut increments: HashMap<(Hash32, u32), NodeWork> = HashMap::new();
    for snap in snapshots {
        let day = (snap.timestamp / NS_PER_DAY) as u32;
        increments.entry((*chain_id, day)).or_default()[0] += 1;
        for signer in &snap.signers {
            if signer == chain_id {
                continue;
            }
            increments.entry((*signer, day)).or_default()[1] += 1;
        }
    }
    let mut out: Vec<_> = increments.into_iter().collect();
    out.sort_by_key(|((id, day), _)| (*id, *day));
    out
}
