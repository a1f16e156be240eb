//! In-memory store used by kernel tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use cinder_core::{
    CustodianUpdateRequest, Domain, Hash32, MintDistribution, RoundSpace, SnapshotWork,
    SnapshotWithTopologicalOrder, VersionedTransaction,
};
use parking_lot::RwLock;

use crate::{round_work_increments, NodeWork, Store, StoreError};

#[derive(Default)]
struct Inner {
    custodians: BTreeMap<u64, CustodianUpdateRequest>,
    mint_distributions: BTreeMap<u64, MintDistribution>,
    node_works: HashMap<(Hash32, u32), NodeWork>,
    round_spaces: HashMap<(Hash32, u64), Vec<RoundSpace>>,
    space_checkpoints: HashMap<Hash32, RoundSpace>,
    work_offsets: HashMap<Hash32, u64>,
    snapshot_works: HashMap<(Hash32, u64), Vec<SnapshotWork>>,
    transaction_cache: HashMap<Hash32, VersionedTransaction>,
    genesis_snapshots: Vec<SnapshotWithTopologicalOrder>,
    state: HashMap<String, Vec<u8>>,
    domains: Vec<Domain>,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
    conflict_once: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `write_round_work` fail with [`StoreError::Conflict`],
    /// to exercise the aggregation retry path.
    pub fn inject_round_work_conflict(&self) {
        self.conflict_once.store(true, Ordering::SeqCst);
    }
}

impl Store for MemStore {
    fn read_custodian(&self, timestamp: u64) -> Result<Option<CustodianUpdateRequest>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .custodians
            .range(..=timestamp)
            .next_back()
            .map(|(_, v)| v.clone()))
    }

    fn write_custodian(&self, request: &CustodianUpdateRequest) -> Result<(), StoreError> {
        self.inner
            .write()
            .custodians
            .insert(request.timestamp, request.clone());
        Ok(())
    }

    fn read_last_mint_distribution(
        &self,
        batch_upper_bound: u64,
    ) -> Result<Option<MintDistribution>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .mint_distributions
            .range(..=batch_upper_bound)
            .next_back()
            .map(|(_, v)| v.clone()))
    }

    fn read_mint_distributions(
        &self,
        batch: u64,
        limit: usize,
    ) -> Result<Vec<MintDistribution>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .mint_distributions
            .range(batch..)
            .take(limit)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn write_mint_distribution(&self, dist: &MintDistribution) -> Result<(), StoreError> {
        self.inner
            .write()
            .mint_distributions
            .insert(dist.batch, dist.clone());
        Ok(())
    }

    fn list_node_works(
        &self,
        node_ids: &[Hash32],
        day: u32,
    ) -> Result<HashMap<Hash32, NodeWork>, StoreError> {
        let inner = self.inner.read();
        let mut out = HashMap::with_capacity(node_ids.len());
        for id in node_ids {
            let work = inner.node_works.get(&(*id, day)).copied().unwrap_or([0, 0]);
            out.insert(*id, work);
        }
        Ok(out)
    }

    fn write_node_work(
        &self,
        node_id: &Hash32,
        day: u32,
        work: NodeWork,
    ) -> Result<(), StoreError> {
        self.inner.write().node_works.insert((*node_id, day), work);
        Ok(())
    }

    fn read_node_round_spaces_for_batch(
        &self,
        node_id: &Hash32,
        batch: u64,
    ) -> Result<Vec<RoundSpace>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .round_spaces
            .get(&(*node_id, batch))
            .cloned()
            .unwrap_or_default())
    }

    fn write_round_space(&self, space: &RoundSpace) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner
            .round_spaces
            .entry((space.node_id, space.batch))
            .or_default()
            .push(space.clone());
        let checkpoint = inner.space_checkpoints.entry(space.node_id).or_insert_with(|| space.clone());
        if space.batch >= checkpoint.batch {
            *checkpoint = space.clone();
        }
        Ok(())
    }

    fn list_aggregated_round_space_checkpoints(
        &self,
        node_ids: &[Hash32],
    ) -> Result<Vec<RoundSpace>, StoreError> {
        let inner = self.inner.read();
        Ok(node_ids
            .iter()
            .filter_map(|id| inner.space_checkpoints.get(id).cloned())
            .collect())
    }

    fn read_work_offset(&self, chain_id: &Hash32) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .work_offsets
            .get(chain_id)
            .copied()
            .unwrap_or(0))
    }

    fn read_snapshot_works_for_node_round(
        &self,
        chain_id: &Hash32,
        round: u64,
    ) -> Result<Vec<SnapshotWork>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .snapshot_works
            .get(&(*chain_id, round))
            .cloned()
            .unwrap_or_default())
    }

    fn write_snapshot_works(
        &self,
        chain_id: &Hash32,
        round: u64,
        works: &[SnapshotWork],
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .snapshot_works
            .insert((*chain_id, round), works.to_vec());
        Ok(())
    }

    fn write_round_work(
        &self,
        chain_id: &Hash32,
        round: u64,
        snapshots: &[SnapshotWork],
    ) -> Result<(), StoreError> {
        if self.conflict_once.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict);
        }
        let mut inner = self.inner.write();
        for ((node_id, day), add) in round_work_increments(chain_id, snapshots) {
            let work = inner.node_works.entry((node_id, day)).or_default();
            work[0] += add[0];
            work[1] += add[1];
        }
        inner.work_offsets.insert(*chain_id, round);
        Ok(())
    }

    fn cache_put_transaction(&self, tx: &VersionedTransaction) -> Result<(), StoreError> {
        self.inner
            .write()
            .transaction_cache
            .insert(tx.payload_hash(), tx.clone());
        Ok(())
    }

    fn cache_get_transaction(
        &self,
        hash: &Hash32,
    ) -> Result<Option<VersionedTransaction>, StoreError> {
        Ok(self.inner.read().transaction_cache.get(hash).cloned())
    }

    fn snapshots_load_genesis(
        &self,
        snapshots: &[SnapshotWithTopologicalOrder],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.genesis_snapshots.is_empty() {
            inner.genesis_snapshots = snapshots.to_vec();
        }
        Ok(())
    }

    fn read_genesis_snapshots(&self) -> Result<Vec<SnapshotWithTopologicalOrder>, StoreError> {
        Ok(self.inner.read().genesis_snapshots.clone())
    }

    fn state_get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().state.get(key).cloned())
    }

    fn state_set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner
            .write()
            .state
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn read_domains(&self) -> Result<Vec<Domain>, StoreError> {
        Ok(self.inner.read().domains.clone())
    }

    fn write_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        self.inner.write().domains.push(domain.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::{Amount, MintGroup};

    fn id(n: u8) -> Hash32 {
        Hash32::from_bytes([n; 32])
    }

    #[test]
    fn custodian_reads_latest_at_or_before_timestamp() {
        let store = MemStore::new();
        assert!(store.read_custodian(10).unwrap().is_none());

        let addr = cinder_core::Address::from_seed(&[7u8; 64]);
        for ts in [5u64, 9, 20] {
            store
                .write_custodian(&CustodianUpdateRequest {
                    custodian: addr.clone(),
                    timestamp: ts,
                })
                .unwrap();
        }
        assert_eq!(store.read_custodian(4).unwrap(), None);
        assert_eq!(store.read_custodian(9).unwrap().unwrap().timestamp, 9);
        assert_eq!(store.read_custodian(100).unwrap().unwrap().timestamp, 20);
    }

    #[test]
    fn last_mint_distribution_respects_upper_bound() {
        let store = MemStore::new();
        for batch in [1u64, 2, 5] {
            store
                .write_mint_distribution(&MintDistribution {
                    batch,
                    amount: Amount::new(batch as u64),
                    group: MintGroup::Universal,
                })
                .unwrap();
        }
        assert_eq!(
            store.read_last_mint_distribution(u64::MAX).unwrap().unwrap().batch,
            5
        );
        assert_eq!(store.read_last_mint_distribution(4).unwrap().unwrap().batch, 2);
        assert_eq!(store.read_mint_distributions(2, 10).unwrap().len(), 2);
    }

    #[test]
    fn round_work_aggregates_and_advances_offset() {
        let store = MemStore::new();
        let chain = id(1);
        let snaps = vec![SnapshotWork {
            hash: id(9),
            timestamp: cinder_core::NS_PER_DAY * 3 + 5,
            signers: vec![id(1), id(2), id(3)],
        }];
        store.write_round_work(&chain, 7, &snaps).unwrap();
        assert_eq!(store.read_work_offset(&chain).unwrap(), 7);

        let works = store.list_node_works(&[id(1), id(2), id(3)], 3).unwrap();
        assert_eq!(works[&id(1)], [1, 0]);
        assert_eq!(works[&id(2)], [0, 1]);
        assert_eq!(works[&id(3)], [0, 1]);
    }

    #[test]
    fn injected_conflict_fails_once() {
        let store = MemStore::new();
        store.inject_round_work_conflict();
        let err = store.write_round_work(&id(1), 0, &[]).unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert!(store.write_round_work(&id(1), 0, &[]).is_ok());
    }

    #[test]
    fn space_checkpoints_track_highest_batch() {
        let store = MemStore::new();
        for batch in [1u64, 4, 3] {
            store
                .write_round_space(&RoundSpace {
                    node_id: id(2),
                    batch,
                    round: batch * 10,
                })
                .unwrap();
        }
        let cps = store.list_aggregated_round_space_checkpoints(&[id(2)]).unwrap();
        assert_eq!(cps.len(), 1);
        assert_eq!(cps[0].batch, 4);
        assert_eq!(
            store.read_node_round_spaces_for_batch(&id(2), 4).unwrap().len(),
            1
        );
    }
}
