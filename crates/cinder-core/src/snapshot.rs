use cinder_crypto::Hash32;
use serde::{Deserialize, Serialize};

use crate::constants::SNAPSHOT_VERSION;
use crate::transaction::SignedTransaction;

/// A snapshot proposed into the DAG. The kernel only ever emits snapshots
/// carrying a single transaction hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u8,
    pub node_id: Hash32,
    pub round_number: u64,
    /// Consensus timestamp in nanoseconds. Zero on a freshly self-proposed
    /// snapshot before the chain assigns one.
    pub timestamp: u64,
    pub transaction: Hash32,
}

impl Snapshot {
    pub fn new(node_id: Hash32) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            node_id,
            round_number: 0,
            timestamp: 0,
            transaction: Hash32::default(),
        }
    }

    pub fn add_sole_transaction(&mut self, hash: Hash32) {
        self.transaction = hash;
    }
}

/// A snapshot together with its full transaction and the monotonic position
/// assigned when it was accepted. Genesis loading writes these directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWithTopologicalOrder {
    pub snapshot: Snapshot,
    pub signed: SignedTransaction,
    pub topological_order: u64,
}
