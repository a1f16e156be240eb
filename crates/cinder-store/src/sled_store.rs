//! sled-backed store (pure-Rust, no C dependencies).
//!
//! Named trees (analogous to column families):
//!   state               — utf8 key            → raw bytes
//!   domains             — u32 BE index        → bincode(Domain)
//!   custodians          — u64 BE timestamp    → bincode(CustodianUpdateRequest)
//!   mint_distributions  — u64 BE batch        → bincode(MintDistribution)
//!   node_works          — node ‖ u32 BE day   → bincode(NodeWork)
//!   round_spaces        — node ‖ u64 BE batch → bincode(Vec<RoundSpace>)
//!   space_checkpoints   — node id bytes       → bincode(RoundSpace)
//!   work_offsets        — chain id bytes      → u64 BE round
//!   snapshot_works      — chain ‖ u64 BE rnd  → bincode(Vec<SnapshotWork>)
//!   transaction_cache   — payload hash bytes  → bincode(VersionedTransaction)
//!   genesis_snapshots   — u64 BE topo order   → bincode(SnapshotWithTopologicalOrder)
//!
//! The work-offset write in `write_round_work` goes through compare-and-swap
//! so a lost race surfaces as `StoreError::Conflict` for the aggregation
//! loop to retry.

use std::collections::HashMap;
use std::path::Path;

use cinder_core::{
    CustodianUpdateRequest, Domain, Hash32, MintDistribution, RoundSpace, SnapshotWork,
    SnapshotWithTopologicalOrder, VersionedTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{round_work_increments, NodeWork, Store, StoreError};

pub struct SledStore {
    _db: sled::Db,
    state: sled::Tree,
    domains: sled::Tree,
    custodians: sled::Tree,
    mint_distributions: sled::Tree,
    node_works: sled::Tree,
    round_spaces: sled::Tree,
    space_checkpoints: sled::Tree,
    work_offsets: sled::Tree,
    snapshot_works: sled::Tree,
    transaction_cache: sled::Tree,
    genesis_snapshots: sled::Tree,
}

fn storage(e: sled::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn enc<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn dec<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn composite_u32(id: &Hash32, n: u32) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(id.as_bytes());
    key[32..].copy_from_slice(&n.to_be_bytes());
    key
}

fn composite_u64(id: &Hash32, n: u64) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(id.as_bytes());
    key[32..].copy_from_slice(&n.to_be_bytes());
    key
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(storage)?;
        let tree = |name: &str| db.open_tree(name).map_err(storage);
        Ok(Self {
            state: tree("state")?,
            domains: tree("domains")?,
            custodians: tree("custodians")?,
            mint_distributions: tree("mint_distributions")?,
            node_works: tree("node_works")?,
            round_spaces: tree("round_spaces")?,
            space_checkpoints: tree("space_checkpoints")?,
            work_offsets: tree("work_offsets")?,
            snapshot_works: tree("snapshot_works")?,
            transaction_cache: tree("transaction_cache")?,
            genesis_snapshots: tree("genesis_snapshots")?,
            _db: db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}

impl Store for SledStore {
    fn read_custodian(&self, timestamp: u64) -> Result<Option<CustodianUpdateRequest>, StoreError> {
        let upper = timestamp.to_be_bytes();
        match self.custodians.range(..=upper.as_slice()).next_back() {
            Some(item) => {
                let (_, value) = item.map_err(storage)?;
                Ok(Some(dec(&value)?))
            }
            None => Ok(None),
        }
    }

    fn write_custodian(&self, request: &CustodianUpdateRequest) -> Result<(), StoreError> {
        self.custodians
            .insert(request.timestamp.to_be_bytes(), enc(request)?)
            .map_err(storage)?;
        Ok(())
    }

    fn read_last_mint_distribution(
        &self,
        batch_upper_bound: u64,
    ) -> Result<Option<MintDistribution>, StoreError> {
        let upper = batch_upper_bound.to_be_bytes();
        match self.mint_distributions.range(..=upper.as_slice()).next_back() {
            Some(item) => {
                let (_, value) = item.map_err(storage)?;
                Ok(Some(dec(&value)?))
            }
            None => Ok(None),
        }
    }

    fn read_mint_distributions(
        &self,
        batch: u64,
        limit: usize,
    ) -> Result<Vec<MintDistribution>, StoreError> {
        let lower = batch.to_be_bytes();
        let mut out = Vec::new();
        for item in self.mint_distributions.range(lower.as_slice()..).take(limit) {
            let (_, value) = item.map_err(storage)?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    fn write_mint_distribution(&self, dist: &MintDistribution) -> Result<(), StoreError> {
        self.mint_distributions
            .insert(dist.batch.to_be_bytes(), enc(dist)?)
            .map_err(storage)?;
        Ok(())
    }

    fn list_node_works(
        &self,
        node_ids: &[Hash32],
        day: u32,
    ) -> Result<HashMap<Hash32, NodeWork>, StoreError> {
        let mut out = HashMap::with_capacity(node_ids.len());
        for id in node_ids {
            let work = match self.node_works.get(composite_u32(id, day)).map_err(storage)? {
                Some(bytes) => dec(&bytes)?,
                None => [0, 0],
            };
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
        self.node_works
            .insert(composite_u32(node_id, day), enc(&work)?)
            .map_err(storage)?;
        Ok(())
    }

    fn read_node_round_spaces_for_batch(
        &self,
        node_id: &Hash32,
        batch: u64,
    ) -> Result<Vec<RoundSpace>, StoreError> {
        match self
            .round_spaces
            .get(composite_u64(node_id, batch))
            .map_err(storage)?
        {
            Some(bytes) => dec(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write_round_space(&self, space: &RoundSpace) -> Result<(), StoreError> {
        let key = composite_u64(&space.node_id, space.batch);
        let mut spaces: Vec<RoundSpace> = match self.round_spaces.get(key).map_err(storage)? {
            Some(bytes) => dec(&bytes)?,
            None => Vec::new(),
        };
        spaces.push(space.clone());
        self.round_spaces.insert(key, enc(&spaces)?).map_err(storage)?;

        let advance = match self
            .space_checkpoints
            .get(space.node_id.as_bytes())
            .map_err(storage)?
        {
            Some(bytes) => {
                let current: RoundSpace = dec(&bytes)?;
                space.batch >= current.batch
            }
            None => true,
        };
        if advance {
            self.space_checkpoints
                .insert(space.node_id.as_bytes(), enc(space)?)
                .map_err(storage)?;
        }
        Ok(())
    }

    fn list_aggregated_round_space_checkpoints(
        &self,
        node_ids: &[Hash32],
    ) -> Result<Vec<RoundSpace>, StoreError> {
        let mut out = Vec::new();
        for id in node_ids {
            if let Some(bytes) = self.space_checkpoints.get(id.as_bytes()).map_err(storage)? {
                out.push(dec(&bytes)?);
            }
        }
        Ok(out)
    }

    fn read_work_offset(&self, chain_id: &Hash32) -> Result<u64, StoreError> {
        match self.work_offsets.get(chain_id.as_bytes()).map_err(storage)? {
            Some(bytes) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn read_snapshot_works_for_node_round(
        &self,
        chain_id: &Hash32,
        round: u64,
    ) -> Result<Vec<SnapshotWork>, StoreError> {
        match self
            .snapshot_works
            .get(composite_u64(chain_id, round))
            .map_err(storage)?
        {
            Some(bytes) => dec(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write_snapshot_works(
        &self,
        chain_id: &Hash32,
        round: u64,
        works: &[SnapshotWork],
    ) -> Result<(), StoreError> {
        self.snapshot_works
            .insert(composite_u64(chain_id, round), enc(&works.to_vec())?)
            .map_err(storage)?;
        Ok(())
    }

    fn write_round_work(
        &self,
        chain_id: &Hash32,
        round: u64,
        snapshots: &[SnapshotWork],
    ) -> Result<(), StoreError> {
        let key = chain_id.as_bytes();
        let old = self.work_offsets.get(key).map_err(storage)?;
        let swap = self
            .work_offsets
            .compare_and_swap(key, old, Some(round.to_be_bytes().to_vec()))
            .map_err(storage)?;
        if swap.is_err() {
            return Err(StoreError::Conflict);
        }

        for ((node_id, day), add) in round_work_increments(chain_id, snapshots) {
            let key = composite_u32(&node_id, day);
            let mut work: NodeWork = match self.node_works.get(key).map_err(storage)? {
                Some(bytes) => dec(&bytes)?,
                None => [0, 0],
            };
            work[0] += add[0];
            work[1] += add[1];
            self.node_works.insert(key, enc(&work)?).map_err(storage)?;
        }
        Ok(())
    }

    fn cache_put_transaction(&self, tx: &VersionedTransaction) -> Result<(), StoreError> {
        self.transaction_cache
            .insert(tx.payload_hash().as_bytes(), enc(tx)?)
            .map_err(storage)?;
        Ok(())
    }

    fn cache_get_transaction(
        &self,
        hash: &Hash32,
    ) -> Result<Option<VersionedTransaction>, StoreError> {
        match self.transaction_cache.get(hash.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(dec(&bytes)?)),
            None => Ok(None),
        }
    }

    fn snapshots_load_genesis(
        &self,
        snapshots: &[SnapshotWithTopologicalOrder],
    ) -> Result<(), StoreError> {
        if !self.genesis_snapshots.is_empty() {
            return Ok(());
        }
        for snap in snapshots {
            self.genesis_snapshots
                .insert(snap.topological_order.to_be_bytes(), enc(snap)?)
                .map_err(storage)?;
        }
        Ok(())
    }

    fn read_genesis_snapshots(&self) -> Result<Vec<SnapshotWithTopologicalOrder>, StoreError> {
        let mut out = Vec::new();
        for item in self.genesis_snapshots.iter() {
            let (_, value) = item.map_err(storage)?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    fn state_get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .state
            .get(key.as_bytes())
            .map_err(storage)?
            .map(|v| v.to_vec()))
    }

    fn state_set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.state.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    fn read_domains(&self) -> Result<Vec<Domain>, StoreError> {
        let mut out = Vec::new();
        for item in self.domains.iter() {
            let (_, value) = item.map_err(storage)?;
            out.push(dec(&value)?);
        }
        Ok(out)
    }

    fn write_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        let index = self.domains.len() as u32;
        self.domains
            .insert(index.to_be_bytes(), enc(domain)?)
            .map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::{Amount, MintGroup};

    fn temp_store(name: &str) -> (SledStore, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cinder_sled_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        (SledStore::open(&dir).unwrap(), dir)
    }

    fn id(n: u8) -> Hash32 {
        Hash32::from_bytes([n; 32])
    }

    #[test]
    fn mint_distribution_range_reads() {
        let (store, dir) = temp_store("dists");
        for batch in [3u64, 8] {
            store
                .write_mint_distribution(&MintDistribution {
                    batch,
                    amount: Amount::new(117),
                    group: MintGroup::KernelNode,
                })
                .unwrap();
        }
        assert_eq!(
            store.read_last_mint_distribution(u64::MAX).unwrap().unwrap().batch,
            8
        );
        assert_eq!(store.read_last_mint_distribution(7).unwrap().unwrap().batch, 3);
        assert!(store.read_last_mint_distribution(2).unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn round_work_conflict_surfaces_on_raced_offset() {
        let (store, dir) = temp_store("conflict");
        let chain = id(1);
        let snaps = vec![SnapshotWork {
            hash: id(9),
            timestamp: cinder_core::NS_PER_DAY,
            signers: vec![id(1), id(2)],
        }];
        store.write_round_work(&chain, 0, &snaps).unwrap();
        assert_eq!(store.read_work_offset(&chain).unwrap(), 0);
        store.write_round_work(&chain, 1, &snaps).unwrap();

        let works = store.list_node_works(&[id(1), id(2)], 1).unwrap();
        assert_eq!(works[&id(1)], [2, 0]);
        assert_eq!(works[&id(2)], [0, 2]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn genesis_snapshots_write_once() {
        let (store, dir) = temp_store("genesis");
        store.snapshots_load_genesis(&[]).unwrap();
        assert!(store.read_genesis_snapshots().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn node_work_and_state_round_trip() {
        let (store, dir) = temp_store("works");
        store.write_node_work(&id(4), 12, [30, 7]).unwrap();
        let works = store.list_node_works(&[id(4), id(5)], 12).unwrap();
        assert_eq!(works[&id(4)], [30, 7]);
        assert_eq!(works[&id(5)], [0, 0]);

        store.state_set("network", b"abc").unwrap();
        assert_eq!(store.state_get("network").unwrap().unwrap(), b"abc");
        assert!(store.state_get("missing").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
