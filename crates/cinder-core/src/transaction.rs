use cinder_crypto::{blake3_hash, derive_ghost_public_key, sign, Hash32, Key, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::amount::Amount;
use crate::constants::{OPERATOR_CMP, OPERATOR_SUM, TX_VERSION};
use crate::error::CinderError;

// ── Mint input data ───────────────────────────────────────────────────────────

/// Which issuance scheme a mint distribution belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MintGroup {
    #[serde(rename = "KERNELNODE")]
    KernelNode,
    #[serde(rename = "UNIVERSAL")]
    Universal,
}

impl fmt::Display for MintGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintGroup::KernelNode => write!(f, "KERNELNODE"),
            MintGroup::Universal => write!(f, "UNIVERSAL"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintData {
    pub group: MintGroup,
    pub batch: u64,
    pub amount: Amount,
}

// ── Inputs and outputs ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub hash: Hash32,
    pub index: u32,
    pub mint: Option<MintData>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Script,
    NodePledge,
}

/// A tiny threshold script: `[OPERATOR_CMP, OPERATOR_SUM, k]` meaning "at
/// least k of the listed keys must sign".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn threshold(k: u8) -> Self {
        Script(vec![OPERATOR_CMP, OPERATOR_SUM, k])
    }

    pub fn validate(&self) -> Result<(), CinderError> {
        if self.0.len() != 3 || self.0[0] != OPERATOR_CMP || self.0[1] != OPERATOR_SUM {
            return Err(CinderError::InvalidScript(hex::encode(&self.0)));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub kind: OutputKind,
    pub amount: Amount,
    pub keys: Vec<Key>,
    pub script: Script,
    pub mask: Key,
}

// ── Transaction ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub asset: Hash32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub extra: Vec<u8>,
}

impl Transaction {
    pub fn new(asset: Hash32) -> Self {
        Self {
            version: TX_VERSION,
            asset,
            inputs: Vec::new(),
            outputs: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn add_universal_mint_input(&mut self, batch: u64, amount: Amount) {
        self.inputs.push(Input {
            hash: Hash32::default(),
            index: 0,
            mint: Some(MintData {
                group: MintGroup::Universal,
                batch,
                amount,
            }),
        });
    }

    pub fn add_kernel_node_mint_input(&mut self, batch: u64, amount: Amount) {
        self.inputs.push(Input {
            hash: Hash32::default(),
            index: 0,
            mint: Some(MintData {
                group: MintGroup::KernelNode,
                batch,
                amount,
            }),
        });
    }

    /// Append a script output addressed to `recipients`, deriving one ghost
    /// key per recipient from the 64-byte `seed`. The mask is the public
    /// form of the seed-derived transaction secret, so anyone holding the
    /// seed can reproduce the exact output.
    pub fn add_script_output(
        &mut self,
        recipients: &[&Address],
        script: Script,
        amount: Amount,
        seed: &[u8; 64],
    ) -> Result<(), CinderError> {
        let r = Key::from_seed(seed);
        let mask = r.public();
        let mut keys = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let ghost = derive_ghost_public_key(
                &r,
                &recipient.public_view_key,
                &recipient.public_spend_key,
            )?;
            keys.push(ghost);
        }
        self.outputs.push(Output {
            kind: OutputKind::Script,
            amount,
            keys,
            script,
            mask,
        });
        Ok(())
    }

    pub fn into_versioned(self) -> VersionedTransaction {
        VersionedTransaction {
            signed: SignedTransaction {
                transaction: self,
                signatures: Vec::new(),
            },
        }
    }
}

// ── Signed / versioned wrappers ───────────────────────────────────────────────

/// A transaction plus its per-input signature vectors. Genesis transactions
/// carry empty signature lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<Vec<Signature>>,
}

impl SignedTransaction {
    pub fn unsigned(transaction: Transaction) -> Self {
        Self {
            transaction,
            signatures: Vec::new(),
        }
    }
}

/// The canonical wire form. The payload (everything except signatures) is
/// what gets hashed: two nodes agree on a mint exactly when their payload
/// hashes agree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTransaction {
    pub signed: SignedTransaction,
}

impl VersionedTransaction {
    /// Canonical payload bytes: bincode of the unsigned transaction.
    pub fn payload_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.signed.transaction).expect("payload serialization is infallible")
    }

    pub fn payload_hash(&self) -> Hash32 {
        blake3_hash(&self.payload_bytes())
    }

    /// Full wire bytes including signatures.
    pub fn marshal(&self) -> Vec<u8> {
        bincode::serialize(&self.signed).expect("transaction serialization is infallible")
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CinderError> {
        let signed: SignedTransaction =
            bincode::deserialize(bytes).map_err(|e| CinderError::Encoding(e.to_string()))?;
        Ok(Self { signed })
    }

    /// Sign input `index` with the private key, appending to that input's
    /// signature vector. The message is the payload hash.
    pub fn sign_input(&mut self, index: usize, key: &Key) -> Result<(), CinderError> {
        let inputs = self.signed.transaction.inputs.len();
        if index >= inputs {
            return Err(CinderError::SignatureIndexOutOfRange { index, inputs });
        }
        let hash = self.payload_hash();
        if self.signed.signatures.len() < inputs {
            self.signed.signatures.resize(inputs, Vec::new());
        }
        self.signed.signatures[index].push(sign(key, hash.as_bytes()));
        Ok(())
    }

    /// Structural validation. Signature verification belongs to the
    /// consensus layer; here we check what the kernel itself guarantees:
    /// a mint transaction's outputs account for its input amount exactly.
    pub fn validate(&self) -> Result<(), CinderError> {
        let tx = &self.signed.transaction;
        if tx.inputs.is_empty() {
            return Err(CinderError::MissingInputs);
        }
        for out in &tx.outputs {
            out.script.validate()?;
        }
        if let Some(mint) = &tx.inputs[0].mint {
            let mut total = Amount::ZERO;
            for out in &tx.outputs {
                total = total.add(out.amount);
            }
            if total != mint.amount {
                return Err(CinderError::MintTotalMismatch {
                    total: total.to_string(),
                    amount: mint.amount.to_string(),
                });
            }
        }
        Ok(())
    }
}
