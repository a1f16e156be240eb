//! Per-chain work aggregation.
//!
//! The consensus layer queues raw snapshot works per chain round; this
//! loop folds them into the daily per-node statistics the distributor
//! reads, advancing a persisted round cursor. The cursor only moves after
//! a successful `write_round_work`, and a conflict from the store is the
//! single retryable condition — anything else is fatal.

use std::sync::Arc;
use std::time::Duration;

use cinder_store::StoreError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::KernelError;
use crate::Node;

impl Node {
    /// Drive the aggregation cursor for this node's own chain until `done`
    /// fires.
    ///
    /// # Panics
    /// Panics if the chain's cache round ever falls behind the persisted
    /// cursor: storage moved backward, which is unrecoverable.
    pub async fn aggregate_mint_work(
        self: Arc<Self>,
        mut done: watch::Receiver<bool>,
    ) -> Result<(), KernelError> {
        let chain_id = self.chain.chain_id;
        let mut round = self.store().read_work_offset(&chain_id)?;
        info!(chain = %chain_id, round, "aggregate mint work begins");

        let wait = Duration::from_secs((self.config.kernel_operation_period / 2).max(1));
        loop {
            if *done.borrow() {
                break;
            }
            let Some(cache_round) = self.chain.cache_round() else {
                debug!(chain = %chain_id, "no chain state yet");
                if wait_or_done(&mut done, wait).await {
                    break;
                }
                continue;
            };
            if cache_round < round {
                panic!("aggregate mint work {chain_id} cache round {cache_round} behind {round}");
            }

            let snapshots = match self.store().read_snapshot_works_for_node_round(&chain_id, round)
            {
                Ok(snapshots) => snapshots,
                Err(err) => {
                    warn!(chain = %chain_id, round, %err, "reading snapshot works");
                    if wait_or_done(&mut done, wait).await {
                        break;
                    }
                    continue;
                }
            };
            if snapshots.is_empty() {
                if wait_or_done(&mut done, wait).await {
                    break;
                }
                continue;
            }

            loop {
                if *done.borrow() {
                    break;
                }
                match self.store().write_round_work(&chain_id, round, &snapshots) {
                    Ok(()) => break,
                    Err(StoreError::Conflict) => {
                        debug!(chain = %chain_id, round, "round work conflict, retrying");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            if round < cache_round {
                round += 1;
            } else if wait_or_done(&mut done, wait).await {
                break;
            }
        }

        info!(chain = %chain_id, round, "aggregate mint work ends");
        Ok(())
    }
}

/// Wait out one poll period, returning early (and `true`) on shutdown.
async fn wait_or_done(done: &mut watch::Receiver<bool>, wait: Duration) -> bool {
    tokio::select! {
        _ = done.changed() => true,
        _ = tokio::time::sleep(wait) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{setup_node, testnet_config, RecordingSink};
    use cinder_core::{Hash32, SnapshotWork, NS_PER_DAY};
    use cinder_store::{MemStore, Store};

    fn snapshot_work(node: &Node, signer: Hash32) -> SnapshotWork {
        SnapshotWork {
            hash: Hash32::from_bytes([9; 32]),
            timestamp: node.epoch + NS_PER_DAY,
            signers: vec![node.chain.chain_id, signer],
        }
    }

    #[tokio::test]
    async fn aggregates_queued_rounds_and_stops_on_done() {
        let store = Arc::new(MemStore::new());
        let node = Arc::new(setup_node(
            store.clone(),
            Arc::new(RecordingSink::default()),
            testnet_config(),
        ));
        let chain_id = node.chain.chain_id;
        let signer = Hash32::from_bytes([3; 32]);

        for round in 0..2 {
            store
                .write_snapshot_works(&chain_id, round, &[snapshot_work(&node, signer)])
                .unwrap();
        }
        node.chain.set_cache_round(1);
        // Force one conflict so the retry path runs too.
        store.inject_round_work_conflict();

        let (stop, done) = watch::channel(false);
        let handle = tokio::spawn(node.clone().aggregate_mint_work(done));

        // Both rounds drain; the cursor then parks at the cache round.
        for _ in 0..200 {
            if store.read_work_offset(&chain_id).unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.read_work_offset(&chain_id).unwrap(), 1);

        let day = ((node.epoch + NS_PER_DAY) / NS_PER_DAY) as u32;
        let works = store.list_node_works(&[chain_id, signer], day).unwrap();
        assert_eq!(works[&chain_id], [2, 0]);
        assert_eq!(works[&signer], [0, 2]);

        stop.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after done")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn waits_until_chain_state_appears() {
        let store = Arc::new(MemStore::new());
        let node = Arc::new(setup_node(
            store.clone(),
            Arc::new(RecordingSink::default()),
            testnet_config(),
        ));
        let chain_id = node.chain.chain_id;
        store
            .write_snapshot_works(&chain_id, 0, &[snapshot_work(&node, Hash32::from_bytes([3; 32]))])
            .unwrap();

        let (stop, done) = watch::channel(false);
        let handle = tokio::spawn(node.clone().aggregate_mint_work(done));

        // No cache round yet: nothing must be aggregated.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let day = ((node.epoch + NS_PER_DAY) / NS_PER_DAY) as u32;
        let works = store.list_node_works(&[chain_id], day).unwrap();
        assert_eq!(works[&chain_id], [0, 0]);

        node.chain.set_cache_round(0);
        for _ in 0..200 {
            if store.list_node_works(&[chain_id], day).unwrap()[&chain_id][0] > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.list_node_works(&[chain_id], day).unwrap()[&chain_id], [1, 0]);

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after done")
            .unwrap()
            .unwrap();
    }
}
