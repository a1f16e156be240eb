//! Mint issuance.
//!
//! Once per day a batch of CDR becomes mintable inside a bounded window of
//! hours. Any kernel node may propose the batch's transaction; all of them
//! must derive the same one. The gate (`check_*_mint_possibility`) decides
//! whether a batch is owed and how much it carries, the builders assemble
//! the canonical transaction from the gate and the work distributor, and
//! `validate_mint_snapshot` replays the whole derivation to check an
//! incoming mint byte-for-byte.
//!
//! Two schemes exist. The legacy kernel-node scheme distributes the full
//! batch across nodes and sweeps the floor dust to the light pool. The
//! universal scheme splits the batch 50/40/10 between kernel nodes, the
//! custodian account and the light pool. The presence of an accepted
//! custodian rotation is what switches a mainnet node to the universal
//! scheme.

use std::sync::Arc;
use std::time::Duration;

use cinder_core::{
    native_asset_id, Address, Amount, CustodianUpdateRequest, MintGroup, Script, Snapshot,
    Transaction, VersionedTransaction, MAINNET_MINT_PERIOD_FORK_BATCH,
    MAINNET_MINT_PERIOD_FORK_TIME_BEGIN, MAINNET_MINT_PERIOD_FORK_TIME_END,
    MAINNET_MINT_TRANSACTION_V2_FORK_BATCH, MAINNET_MINT_TRANSACTION_V3_FORK_BATCH, NS_PER_HOUR,
    OPERATOR_64,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::KernelError;
use crate::pool::{pool_size_legacy, pool_size_universal};
use crate::{wide_seed, Node};

/// Historical mainnet batches whose transactions were pinned verbatim;
/// they are replayed from raw bytes instead of being rebuilt. None exist
/// on the current chain.
const MINT_WORK_HACKS: &[(u64, &str)] = &[];

pub fn mint_work_hack(batch: u64) -> Option<&'static str> {
    MINT_WORK_HACKS
        .iter()
        .find(|(b, _)| *b == batch)
        .map(|(_, raw)| *raw)
}

/// # Panics
/// A pinned transaction that fails to decode is a corrupted build; there
/// is nothing sensible to do but stop.
pub(crate) fn decode_pinned_transaction(raw: &str) -> VersionedTransaction {
    let bytes =
        hex::decode(raw).unwrap_or_else(|_| panic!("malformed pinned mint transaction {raw}"));
    VersionedTransaction::unmarshal(&bytes)
        .unwrap_or_else(|_| panic!("malformed pinned mint transaction {raw}"))
}

impl Node {
    // ── Gates ────────────────────────────────────────────────────────────────

    /// Whether a universal mint is owed at `timestamp`, and its amount.
    ///
    /// With `validate_only`, a batch equal to the last persisted one is
    /// replayed with the persisted amount so an already-accepted mint can
    /// be re-derived; otherwise an equal batch means the work is done.
    pub fn check_universal_mint_possibility(
        &self,
        timestamp: u64,
        validate_only: bool,
    ) -> Result<Option<(u64, Amount)>, KernelError> {
        let Some((batch, hours)) = self.batch_at(timestamp) else {
            return Ok(None);
        };
        let kmb = self.config.kernel_mint_time_begin;
        let kme = self.config.kernel_mint_time_end;
        if hours % 24 < kmb || hours % 24 > kme {
            return Ok(None);
        }
        let total = self.per_batch_amount(batch);
        self.settle_against_last_distribution(batch, total, validate_only)
    }

    /// The legacy gate: same skeleton, but the mint window was pinned to
    /// [6, 18] before the mainnet period fork, and only 9/10 of the daily
    /// share is spendable (the light-pool reservation).
    pub fn check_legacy_mint_possibility(
        &self,
        timestamp: u64,
        validate_only: bool,
    ) -> Result<Option<(u64, Amount)>, KernelError> {
        let Some((batch, hours)) = self.batch_at(timestamp) else {
            return Ok(None);
        };
        let mut kmb = self.config.kernel_mint_time_begin;
        let mut kme = self.config.kernel_mint_time_end;
        if self.is_mainnet() && batch < MAINNET_MINT_PERIOD_FORK_BATCH {
            kmb = MAINNET_MINT_PERIOD_FORK_TIME_BEGIN;
            kme = MAINNET_MINT_PERIOD_FORK_TIME_END;
        }
        if hours % 24 < kmb || hours % 24 > kme {
            return Ok(None);
        }
        let total = self.per_batch_amount(batch);
        let light = total.div(10);
        let full = light.mul(9);
        self.settle_against_last_distribution(batch, full, validate_only)
    }

    /// `(batch, elapsed hours)` at `timestamp`, or `None` before the first
    /// batch is complete.
    fn batch_at(&self, timestamp: u64) -> Option<(u64, u64)> {
        if timestamp <= self.epoch {
            return None;
        }
        let since = timestamp - self.epoch;
        let hours = since / NS_PER_HOUR;
        let batch = hours / 24;
        if batch < 1 {
            return None;
        }
        Some((batch, hours))
    }

    /// The full daily share at `batch`: reduce the pool by a tenth per
    /// elapsed year, then take one year-share divided into daily batches.
    fn per_batch_amount(&self, batch: u64) -> Amount {
        let config = &self.mint_config;
        let mut pool = config.pool;
        for _ in 0..batch / config.year_batches {
            pool = pool.sub(pool.div(config.year_shares));
        }
        pool = pool.div(config.year_shares);
        pool.div(config.year_batches)
    }

    fn settle_against_last_distribution(
        &self,
        batch: u64,
        per_batch: Amount,
        validate_only: bool,
    ) -> Result<Option<(u64, Amount)>, KernelError> {
        let dist = self.store().read_last_mint_distribution(u64::MAX)?;
        let (dist_batch, dist_amount) = dist
            .map(|d| (d.batch, d.amount))
            .unwrap_or((0, Amount::ZERO));
        debug!(batch, %per_batch, dist_batch, %dist_amount, "mint gate");

        if batch < dist_batch {
            return Ok(None);
        }
        if batch == dist_batch {
            if validate_only {
                return Ok(Some((batch, dist_amount)));
            }
            return Ok(None);
        }
        let amount = per_batch.mul(batch - dist_batch);
        Ok(Some((batch, amount)))
    }

    // ── Builders ─────────────────────────────────────────────────────────────

    /// Assemble the canonical universal mint transaction for `timestamp`,
    /// or `None` when no mint is owed or the distributor is not ready.
    pub fn build_universal_mint_transaction(
        &self,
        custodian_request: Option<&CustodianUpdateRequest>,
        timestamp: u64,
        validate_only: bool,
    ) -> Result<Option<VersionedTransaction>, KernelError> {
        let Some((batch, amount)) = self.check_universal_mint_possibility(timestamp, validate_only)?
        else {
            return Ok(None);
        };
        if amount.sign() == 0 {
            return Ok(None);
        }

        let kernel = amount.div(10).mul(5);
        let accepted = self.nodes_list_without_state(timestamp, true);
        let mints = match self.distribute_kernel_mint_by_works(&accepted, kernel, timestamp) {
            Ok(mints) => mints,
            Err(err) => {
                warn!(%err, "universal mint distribution unavailable");
                return Ok(None);
            }
        };

        let mut tx = Transaction::new(native_asset_id());
        tx.add_universal_mint_input(batch, amount);
        let mut total = Amount::ZERO;
        for m in &mints {
            let seed = wide_seed(&format!("{}MINTKERNELNODE{}", m.node.signer, batch));
            tx.add_script_output(&[&m.node.payee], Script::threshold(1), m.work, &seed)?;
            total = total.add(m.work);
        }
        if total > amount {
            panic!("universal mint overshoot {amount} {total}");
        }

        let safe = amount.div(10).mul(4);
        let custodian = match custodian_request {
            Some(request) => request.custodian.clone(),
            None => {
                let domains = self.store().read_domains()?;
                domains
                    .first()
                    .ok_or(KernelError::MissingDomain)?
                    .account
                    .clone()
            }
        };
        let seed = wide_seed(&format!("{custodian}MINTCUSTODIANACCOUNT{batch}"));
        tx.add_script_output(&[&custodian], Script::threshold(1), safe, &seed)?;
        total = total.add(safe);
        if total > amount {
            panic!("universal mint overshoot {amount} {total}");
        }

        let amount = self.try_to_slash_legacy_light_pool(batch, &mut tx)?;

        let light = amount.sub(total);
        let light_address = Address::from_seed(&[0u8; 64]);
        let seed = wide_seed(&format!("{light_address}MINTLIGHTACCOUNT{batch}"));
        tx.add_script_output(
            &[&light_address],
            Script::threshold(OPERATOR_64),
            light,
            &seed,
        )?;
        Ok(Some(tx.into_versioned()))
    }

    /// One-shot switchover credit: when the previous batch was still a
    /// kernel-node distribution and this one is universal, the legacy
    /// light-pool reservation that was never spent is added to the mint
    /// input. Returns the (possibly adjusted) input amount.
    ///
    /// # Panics
    /// Panics if the previous batch's distribution is missing or out of
    /// sequence — the store has diverged from the chain.
    fn try_to_slash_legacy_light_pool(
        &self,
        batch: u64,
        tx: &mut Transaction,
    ) -> Result<Amount, KernelError> {
        let mint = match tx.inputs.first_mut().and_then(|i| i.mint.as_mut()) {
            Some(mint) => mint,
            None => return Err(cinder_core::CinderError::MissingInputs.into()),
        };
        if !self.is_mainnet() || batch < MAINNET_MINT_TRANSACTION_V3_FORK_BATCH {
            return Ok(mint.amount);
        }

        let previous = self.store().read_mint_distributions(batch - 1, 1)?;
        let previous = match previous.first() {
            Some(previous) if previous.batch + 1 == batch => previous,
            other => panic!("slash legacy light pool {other:?} {batch}"),
        };
        if previous.group == mint.group {
            return Ok(mint.amount);
        }

        let slash = pool_size_legacy(&self.mint_config, previous.batch)
            .sub(pool_size_universal(&self.mint_config, previous.batch));
        mint.amount = mint.amount.add(slash);
        Ok(mint.amount)
    }

    /// Assemble the canonical legacy kernel-node mint transaction.
    pub fn build_legacy_mint_transaction(
        &self,
        timestamp: u64,
        validate_only: bool,
    ) -> Result<Option<VersionedTransaction>, KernelError> {
        let Some((batch, amount)) = self.check_legacy_mint_possibility(timestamp, validate_only)?
        else {
            return Ok(None);
        };
        if amount.sign() == 0 {
            return Ok(None);
        }

        if self.is_mainnet() {
            if let Some(raw) = mint_work_hack(batch) {
                return Ok(Some(decode_pinned_transaction(raw)));
            }
            if batch < MAINNET_MINT_TRANSACTION_V2_FORK_BATCH {
                warn!(batch, "legacy mint batch predates the v2 transaction format");
                return Ok(None);
            }
        }

        let accepted = self.nodes_list_without_state(timestamp, true);
        let mints = match self.distribute_kernel_mint_by_works(&accepted, amount, timestamp) {
            Ok(mints) => mints,
            Err(err) => {
                warn!(%err, "legacy mint distribution unavailable");
                return Ok(None);
            }
        };

        let mut tx = Transaction::new(native_asset_id());
        tx.add_kernel_node_mint_input(batch, amount);
        let script = Script::threshold(1);
        let mut total = Amount::ZERO;
        for m in &mints {
            let seed = wide_seed(&format!("{}MINTKERNELNODE{}", m.node.signer, batch));
            tx.add_script_output(&[&m.node.payee], script.clone(), m.work, &seed)?;
            total = total.add(m.work);
        }
        if total > amount {
            panic!("legacy mint overshoot {amount} {total}");
        }

        let diff = amount.sub(total);
        if diff.sign() > 0 {
            let light_address = Address::from_seed(&[0u8; 64]);
            let seed = wide_seed(&format!("{light_address}MINTKERNELNODE{batch}DIFF"));
            tx.add_script_output(
                &[&light_address],
                Script::threshold(OPERATOR_64),
                diff,
                &seed,
            )?;
        }
        Ok(Some(tx.into_versioned()))
    }

    // ── Proposal ─────────────────────────────────────────────────────────────

    pub fn try_to_mint_universal(
        &self,
        custodian_request: Option<&CustodianUpdateRequest>,
    ) -> Result<(), KernelError> {
        let timestamp = self.graph_timestamp();
        let Some(mut signed) =
            self.build_universal_mint_transaction(custodian_request, timestamp, false)?
        else {
            return Ok(());
        };
        self.propose_mint(&mut signed)
    }

    pub fn try_to_mint_kernel_node_legacy(&self) -> Result<(), KernelError> {
        let timestamp = self.graph_timestamp();
        let Some(mut signed) = self.build_legacy_mint_transaction(timestamp, false)? else {
            return Ok(());
        };
        self.propose_mint(&mut signed)
    }

    fn propose_mint(&self, signed: &mut VersionedTransaction) -> Result<(), KernelError> {
        signed.sign_input(0, self.signer_private_key())?;
        signed.validate()?;
        self.store().cache_put_transaction(signed)?;

        let mut snapshot = Snapshot::new(self.id_for_network);
        snapshot.add_sole_transaction(signed.payload_hash());
        info!(hash = %signed.payload_hash(), "mint transaction proposed");
        debug!(raw = %hex::encode(signed.marshal()), "mint transaction bytes");
        self.sink().append_self_empty(snapshot)
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Re-derive the expected mint transaction for `snap` and compare
    /// payload hashes. A self-proposed snapshot without a timestamp is
    /// checked against the wall clock — the only place the kernel reads it.
    pub fn validate_mint_snapshot(
        &self,
        snap: &Snapshot,
        tx: &VersionedTransaction,
    ) -> Result<(), KernelError> {
        let mut timestamp = snap.timestamp;
        if timestamp == 0 && snap.node_id == self.id_for_network {
            timestamp = chrono::Utc::now()
                .timestamp_nanos_opt()
                .expect("wall clock within nanosecond range") as u64;
        }

        let custodian = self.store().read_custodian(timestamp)?;
        let expected = if custodian.is_none() && self.is_mainnet() {
            self.build_legacy_mint_transaction(timestamp, true)?
                .ok_or(KernelError::NoMintAvailable {
                    group: "legacy",
                    timestamp,
                })?
        } else {
            self.build_universal_mint_transaction(custodian.as_ref(), timestamp, true)?
                .ok_or(KernelError::NoMintAvailable {
                    group: "universal",
                    timestamp,
                })?
        };

        if tx.payload_hash() != expected.payload_hash() {
            return Err(KernelError::MalformedMintTransaction {
                timestamp,
                theirs: hex::encode(tx.payload_bytes()),
                ours: hex::encode(expected.payload_bytes()),
            });
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Remaining pool size according to the last persisted distribution.
    pub fn pool_size(&self) -> Result<Amount, KernelError> {
        let dist = self.store().read_last_mint_distribution(u64::MAX)?;
        Ok(match dist {
            Some(d) if d.group == MintGroup::KernelNode => {
                pool_size_legacy(&self.mint_config, d.batch)
            }
            Some(d) => pool_size_universal(&self.mint_config, d.batch),
            None => self.mint_config.pool,
        })
    }

    /// Pledge required of a node joining at `timestamp`.
    pub fn pledge_amount(&self, timestamp: u64) -> Amount {
        let since = timestamp.saturating_sub(self.epoch);
        crate::pool::pledge_amount(&self.mint_config, since)
    }

    // ── Loop ─────────────────────────────────────────────────────────────────

    /// The periodic mint driver. Every tick it reads the custodian state,
    /// picks the scheme, and tries to propose. Per-tick errors are logged
    /// and swallowed; the next tick retries. Returns when `done` fires.
    pub async fn mint_loop(self: Arc<Self>, mut done: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.kernel_operation_period.max(1));
        info!(period_secs = period.as_secs(), "mint loop starting");
        loop {
            tokio::select! {
                _ = done.changed() => break,
                _ = tokio::time::sleep(period) => self.mint_tick(),
            }
        }
        info!("mint loop stopped");
    }

    fn mint_tick(&self) {
        let timestamp = self.graph_timestamp();
        let custodian = match self.store().read_custodian(timestamp) {
            Ok(custodian) => custodian,
            Err(err) => {
                error!(%err, "reading custodian state");
                return;
            }
        };
        let outcome = if custodian.is_none() && self.is_mainnet() {
            self.try_to_mint_kernel_node_legacy()
        } else {
            self.try_to_mint_universal(custodian.as_ref())
        };
        if let Err(err) = outcome {
            warn!(node = %self.id_for_network, %err, "mint attempt failed");
        }
    }
}
