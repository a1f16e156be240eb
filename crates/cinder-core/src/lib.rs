pub mod address;
pub mod amount;
pub mod constants;
pub mod error;
pub mod records;
pub mod snapshot;
pub mod transaction;

pub use address::Address;
pub use amount::{Amount, Ration};
pub use cinder_crypto::{Hash32, Key, KeyError, Signature};
pub use constants::*;
pub use error::CinderError;
pub use records::{CustodianUpdateRequest, Domain, MintDistribution, RoundSpace, SnapshotWork};
pub use snapshot::{Snapshot, SnapshotWithTopologicalOrder};
pub use transaction::{
    Input, MintData, MintGroup, Output, OutputKind, Script, SignedTransaction, Transaction,
    VersionedTransaction,
};
