//! Genesis bootstrap.
//!
//! The genesis file declares the founding consensus nodes and their
//! balances. Loading it is a one-shot operation: the node derives the
//! network id from the canonical JSON encoding, synthesizes one pledge
//! transaction per declared node, writes the resulting snapshots, and pins
//! the network id in the state table so a later boot against a different
//! genesis is rejected outright.

use std::path::Path;

use cinder_core::{
    Address, Amount, Hash32, Input, Key, Output, OutputKind, Script, Snapshot,
    SnapshotWithTopologicalOrder, Transaction, MINIMUM_NODE_COUNT, OPERATOR_CMP, OPERATOR_SUM,
    PLEDGE_AMOUNT,
};
use cinder_crypto::derive_ghost_public_key;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::KernelError;
use crate::{wide_seed, NetworkState, Node, STATE_KEY_NETWORK};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisNode {
    pub address: Address,
    pub balance: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Genesis {
    /// UNIX seconds.
    pub epoch: i64,
    pub nodes: Vec<GenesisNode>,
}

impl Genesis {
    /// The network id binds every snapshot to this exact starting state:
    /// `BLAKE3(canonical_json(genesis))`.
    pub fn network_id(&self) -> Result<Hash32, KernelError> {
        let data = serde_json::to_vec(self)
            .map_err(|e| KernelError::GenesisEncoding(e.to_string()))?;
        Ok(cinder_crypto::blake3_hash(&data))
    }

    pub fn epoch_ns(&self) -> Result<u64, KernelError> {
        if self.epoch <= 0 {
            return Err(KernelError::InvalidGenesisEpoch(self.epoch));
        }
        Ok(self.epoch as u64 * 1_000_000_000)
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        self.epoch_ns()?;
        if self.nodes.len() != MINIMUM_NODE_COUNT {
            return Err(KernelError::InvalidGenesisNodeCount {
                got: self.nodes.len(),
                want: MINIMUM_NODE_COUNT,
            });
        }

        let pledge = Amount::new(PLEDGE_AMOUNT);
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.balance < pledge {
                return Err(KernelError::InvalidGenesisBalance(node.balance.to_string()));
            }
            if !seen.insert(node.address.to_string()) {
                return Err(KernelError::DuplicatedGenesisInput(node.address.to_string()));
            }
            let derived = Address::view_key_for_spend(&node.address.public_spend_key);
            if derived != node.address.public_view_key {
                return Err(KernelError::InvalidNodeKey {
                    derived: derived.to_hex(),
                    declared: node.address.public_view_key.to_hex(),
                });
            }
        }
        Ok(())
    }
}

/// Read and validate `genesis.json` under `config_dir`.
pub fn read_genesis(config_dir: &Path) -> Result<Genesis, KernelError> {
    let path = config_dir.join("genesis.json");
    let file_err = |reason: String| KernelError::GenesisFile {
        path: path.display().to_string(),
        reason,
    };
    let data = std::fs::read(&path).map_err(|e| file_err(e.to_string()))?;
    let gns: Genesis = serde_json::from_slice(&data).map_err(|e| file_err(e.to_string()))?;
    gns.validate()?;
    Ok(gns)
}

impl Node {
    /// Materialize the genesis snapshots, or verify a prior
    /// materialization. Never rewrites an initialized store.
    pub(crate) fn load_genesis(&self, gns: &Genesis) -> Result<(), KernelError> {
        if let Some(bytes) = self.store().state_get(STATE_KEY_NETWORK)? {
            let state: NetworkState = bincode::deserialize(&bytes)
                .map_err(|e| cinder_store::StoreError::Serialization(e.to_string()))?;
            if state.id == self.network_id {
                info!(network = %self.network_id, "genesis already loaded");
                return Ok(());
            }
            return Err(KernelError::NetworkMismatch(state.id.to_hex()));
        }

        let snapshots = self.build_genesis_snapshots(gns)?;
        self.store().snapshots_load_genesis(&snapshots)?;

        let state = NetworkState {
            id: self.network_id,
        };
        let bytes = bincode::serialize(&state)
            .map_err(|e| cinder_store::StoreError::Serialization(e.to_string()))?;
        self.store().state_set(STATE_KEY_NETWORK, &bytes)?;
        info!(
            network = %self.network_id,
            snapshots = snapshots.len(),
            "genesis loaded"
        );
        Ok(())
    }

    fn build_genesis_snapshots(
        &self,
        gns: &Genesis,
    ) -> Result<Vec<SnapshotWithTopologicalOrder>, KernelError> {
        let epoch = gns.epoch_ns()?;
        let pledge = Amount::new(PLEDGE_AMOUNT);
        let threshold = (gns.nodes.len() * 2 / 3 + 1) as u8;

        let mut snapshots = Vec::with_capacity(gns.nodes.len());
        for (index, node) in gns.nodes.iter().enumerate() {
            let r = Key::from_seed(&wide_seed(&format!("{}NODEPLEDGE", node.address)));
            let mask = r.public();
            let mut keys = Vec::with_capacity(gns.nodes.len());
            for d in &gns.nodes {
                let key = derive_ghost_public_key(
                    &r,
                    &d.address.public_view_key,
                    &d.address.public_spend_key,
                )?;
                keys.push(key);
            }

            let mut tx = Transaction::new(cinder_core::native_asset_id());
            tx.inputs.push(Input {
                hash: Hash32::default(),
                index: index as u32,
                mint: None,
            });
            tx.outputs.push(Output {
                kind: OutputKind::NodePledge,
                amount: pledge,
                keys,
                script: Script(vec![OPERATOR_CMP, OPERATOR_SUM, threshold]),
                mask,
            });
            tx.extra = node.address.public_spend_key.as_bytes().to_vec();

            let remaining = node.balance.sub(pledge);
            if remaining.sign() > 0 {
                let r = Key::from_seed(&wide_seed(&format!("{}NODEREMAINING", node.address)));
                let mask = r.public();
                let key = derive_ghost_public_key(
                    &r,
                    &node.address.public_view_key,
                    &node.address.public_spend_key,
                )?;
                tx.outputs.push(Output {
                    kind: OutputKind::Script,
                    amount: remaining,
                    keys: vec![key],
                    script: Script::threshold(1),
                    mask,
                });
            }

            let versioned = tx.into_versioned();
            let mut snapshot = Snapshot::new(node.address.hash().for_network(&self.network_id));
            snapshot.timestamp = epoch;
            snapshot.add_sole_transaction(versioned.payload_hash());
            snapshots.push(SnapshotWithTopologicalOrder {
                snapshot,
                signed: versioned.signed,
                topological_order: self.next_topology(),
            });
        }
        Ok(snapshots)
    }
}
