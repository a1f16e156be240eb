//! Shared helpers for kernel unit tests.

use std::sync::Arc;

use cinder_core::{Address, Amount, Key, Snapshot, MINIMUM_NODE_COUNT};
use cinder_store::MemStore;
use parking_lot::Mutex;

use crate::genesis::{Genesis, GenesisNode};
use crate::pool::MintConfig;
use crate::{wide_seed, KernelError, Node, NodeConfig, SnapshotSink};

/// A sink that records every snapshot handed to it.
#[derive(Default)]
pub struct RecordingSink {
    pub snapshots: Mutex<Vec<Snapshot>>,
}

impl SnapshotSink for RecordingSink {
    fn append_self_empty(&self, snapshot: Snapshot) -> Result<(), KernelError> {
        self.snapshots.lock().push(snapshot);
        Ok(())
    }
}

pub fn node_key(index: usize) -> Key {
    Key::from_seed(&wide_seed(&format!("genesis node {index}")))
}

/// Seven deterministic nodes; node 0 pledges its whole balance, the rest
/// keep a 3 000 CDR remainder. The epoch sits on a UTC day boundary so
/// batch `b` at hour `h` lands on calendar day `epoch_day + b`.
pub fn test_genesis() -> Genesis {
    let nodes = (0..MINIMUM_NODE_COUNT)
        .map(|i| GenesisNode {
            address: Address::from_spend_private(&node_key(i)),
            balance: Amount::new(if i == 0 { 10_000 } else { 13_000 }),
        })
        .collect();
    Genesis {
        epoch: 1_699_920_000,
        nodes,
    }
}

pub fn testnet_config() -> NodeConfig {
    NodeConfig {
        network: "testnet".to_string(),
        kernel_operation_period: 1,
        kernel_mint_time_begin: 0,
        kernel_mint_time_end: 23,
    }
}

pub fn setup_node(store: Arc<MemStore>, sink: Arc<RecordingSink>, config: NodeConfig) -> Node {
    Node::setup(
        store,
        sink,
        config,
        MintConfig::default(),
        node_key(0),
        &test_genesis(),
    )
    .unwrap()
}

/// Mark both aggregators caught up to `day` for every accepted node.
pub fn make_aggregators_ready(node: &Node, store: &MemStore, day: u64) {
    use cinder_core::{RoundSpace, NS_PER_DAY};
    use cinder_store::Store;

    let epoch_day = node.epoch / NS_PER_DAY;
    for n in node.nodes_list_without_state(u64::MAX, true) {
        store
            .write_node_work(&n.id_for_network, day as u32, [1, 0])
            .unwrap();
        store
            .write_round_space(&RoundSpace {
                node_id: n.id_for_network,
                batch: day - epoch_day,
                round: 1,
            })
            .unwrap();
    }
}

/// Give every accepted node the same raw `[produced, signed]` pair for
/// `day`.
pub fn seed_uniform_works(node: &Node, store: &MemStore, day: u64, work: [u64; 2]) {
    use cinder_store::Store;

    for n in node.nodes_list_without_state(u64::MAX, true) {
        store
            .write_node_work(&n.id_for_network, day as u32, work)
            .unwrap();
    }
}
