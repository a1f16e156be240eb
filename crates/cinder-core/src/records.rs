//! Persisted record types read and written through the store interface.

use cinder_crypto::Hash32;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Amount;
use crate::transaction::MintGroup;

/// One accepted mint batch. The latest record pins the next valid batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintDistribution {
    pub batch: u64,
    pub amount: Amount,
    pub group: MintGroup,
}

/// Per-node round-space checkpoint, used to gate distribution readiness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSpace {
    pub node_id: Hash32,
    pub batch: u64,
    pub round: u64,
}

/// The raw material the aggregation loop folds into daily work statistics:
/// one snapshot observed on a chain round, with the nodes that signed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWork {
    pub hash: Hash32,
    pub timestamp: u64,
    pub signers: Vec<Hash32>,
}

/// An accepted custodian rotation. Its presence switches minting from the
/// legacy kernel-node scheme to the universal scheme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianUpdateRequest {
    pub custodian: Address,
    pub timestamp: u64,
}

/// A registered domain account; the first one is the default custodian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub account: Address,
}
