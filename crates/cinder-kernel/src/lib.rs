//! cinder-kernel
//!
//! Genesis bootstrap and daily mint issuance. The kernel is deliberately
//! deterministic: given the same genesis declaration, the same persisted
//! mint distributions and the same aggregated work statistics, every node
//! derives bit-identical mint transactions without coordination. Anything
//! nondeterministic (consensus, gossip, signing ceremonies beyond the
//! node's own key) lives outside this crate and is reached through the
//! store and sink interfaces.

pub mod aggregate;
pub mod distribute;
pub mod error;
pub mod genesis;
pub mod mint;
pub mod pool;

#[cfg(test)]
pub(crate) mod testkit;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cinder_core::{Address, Hash32, Key, Snapshot, NETWORK_MAINNET};
use cinder_store::Store;
use serde::{Deserialize, Serialize};

pub use distribute::{CNode, CNodeWork};
pub use error::KernelError;
pub use genesis::{read_genesis, Genesis, GenesisNode};
pub use pool::{pledge_amount, pool_size_legacy, pool_size_universal, MintConfig};

/// State-table key holding the network id. Written exactly once.
pub const STATE_KEY_NETWORK: &str = "network";

/// The persisted network binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub id: Hash32,
}

/// Kernel-facing node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network name; `"mainnet"` enables the historical fork behaviors.
    pub network: String,
    /// Mint loop tick period in seconds.
    pub kernel_operation_period: u64,
    /// First hour of day (since epoch) in which a mint may be proposed.
    pub kernel_mint_time_begin: u64,
    /// Last such hour, inclusive.
    pub kernel_mint_time_end: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NETWORK_MAINNET.to_string(),
            kernel_operation_period: 60,
            kernel_mint_time_begin: 6,
            kernel_mint_time_end: 18,
        }
    }
}

/// Where candidate snapshots go: the consensus layer's intake queue.
pub trait SnapshotSink: Send + Sync {
    fn append_self_empty(&self, snapshot: Snapshot) -> Result<(), KernelError>;
}

/// Per-chain aggregation cursor state. The consensus layer advances the
/// cache round as new rounds finalize; the aggregation loop follows it.
#[derive(Debug)]
pub struct Chain {
    pub chain_id: Hash32,
    cache_round: AtomicU64,
}

impl Chain {
    const NO_STATE: u64 = u64::MAX;

    pub fn new(chain_id: Hash32) -> Self {
        Self {
            chain_id,
            cache_round: AtomicU64::new(Self::NO_STATE),
        }
    }

    pub fn set_cache_round(&self, round: u64) {
        self.cache_round.store(round, Ordering::SeqCst);
    }

    /// `None` until the chain has any state.
    pub fn cache_round(&self) -> Option<u64> {
        match self.cache_round.load(Ordering::SeqCst) {
            Self::NO_STATE => None,
            round => Some(round),
        }
    }
}

/// The kernel node: an explicit record of its collaborators rather than a
/// grab-bag of globals, so tests can assemble one around the in-memory
/// store with any configuration.
pub struct Node {
    store: Arc<dyn Store>,
    sink: Arc<dyn SnapshotSink>,
    pub config: NodeConfig,
    pub mint_config: MintConfig,
    /// Genesis timestamp in nanoseconds.
    pub epoch: u64,
    pub network_id: Hash32,
    pub id_for_network: Hash32,
    pub signer: Address,
    signer_key: Key,
    consensus_nodes: Vec<CNode>,
    graph_timestamp: AtomicU64,
    topology: AtomicU64,
    pub chain: Chain,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("mint_config", &self.mint_config)
            .field("epoch", &self.epoch)
            .field("network_id", &self.network_id)
            .field("id_for_network", &self.id_for_network)
            .field("signer", &self.signer)
            .field("consensus_nodes", &self.consensus_nodes)
            .field("graph_timestamp", &self.graph_timestamp)
            .field("topology", &self.topology)
            .field("chain", &self.chain)
            .finish()
    }
}

impl Node {
    /// Assemble a node and perform the one-shot genesis load. The genesis
    /// declaration must already be validated (see [`read_genesis`] and
    /// [`Genesis::validate`]); `setup` re-validates defensively since
    /// everything downstream depends on its invariants.
    pub fn setup(
        store: Arc<dyn Store>,
        sink: Arc<dyn SnapshotSink>,
        config: NodeConfig,
        mint_config: MintConfig,
        signer_key: Key,
        gns: &Genesis,
    ) -> Result<Node, KernelError> {
        gns.validate()?;
        let network_id = gns.network_id()?;
        let epoch = gns.epoch_ns()?;

        let signer = Address::from_spend_private(&signer_key);
        let id_for_network = signer.hash().for_network(&network_id);

        let mut consensus_nodes: Vec<CNode> = gns
            .nodes
            .iter()
            .map(|n| CNode {
                id_for_network: n.address.hash().for_network(&network_id),
                signer: n.address.clone(),
                payee: n.address.clone(),
                accepted_at: epoch,
            })
            .collect();
        consensus_nodes.sort_by_key(|n| n.id_for_network);

        let node = Node {
            store,
            sink,
            config,
            mint_config,
            epoch,
            network_id,
            id_for_network,
            signer,
            signer_key,
            consensus_nodes,
            graph_timestamp: AtomicU64::new(0),
            topology: AtomicU64::new(0),
            chain: Chain::new(id_for_network),
        };
        node.load_genesis(gns)?;
        Ok(node)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn sink(&self) -> &Arc<dyn SnapshotSink> {
        &self.sink
    }

    pub(crate) fn signer_private_key(&self) -> &Key {
        &self.signer_key
    }

    pub fn is_mainnet(&self) -> bool {
        self.config.network == NETWORK_MAINNET
    }

    /// The consensus-derived timestamp all production mint paths use.
    pub fn graph_timestamp(&self) -> u64 {
        self.graph_timestamp.load(Ordering::SeqCst)
    }

    pub fn set_graph_timestamp(&self, timestamp: u64) {
        self.graph_timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// Consensus nodes accepted at `timestamp`, in stable
    /// `id_for_network` order.
    pub fn nodes_list_without_state(&self, timestamp: u64, accepted: bool) -> Vec<CNode> {
        if !accepted {
            return Vec::new();
        }
        self.consensus_nodes
            .iter()
            .filter(|n| n.accepted_at <= timestamp)
            .cloned()
            .collect()
    }

    /// `⌊2n/3⌋ + 1` over the accepted node set.
    pub fn consensus_threshold(&self, timestamp: u64) -> usize {
        let n = self.nodes_list_without_state(timestamp, true).len();
        n * 2 / 3 + 1
    }

    pub(crate) fn next_topology(&self) -> u64 {
        self.topology.fetch_add(1, Ordering::SeqCst)
    }
}

/// Stretch a label to the 64-byte seed format: `H(label) ‖ H(label)`.
pub(crate) fn wide_seed(label: &str) -> [u8; 64] {
    let h = cinder_crypto::blake3_hash(label.as_bytes());
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(h.as_bytes());
    seed[32..].copy_from_slice(h.as_bytes());
    seed
}
