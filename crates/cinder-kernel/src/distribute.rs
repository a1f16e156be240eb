//! Mint work distribution.
//!
//! Each node's share of a mint batch is derived from the previous day's
//! aggregated statistics: 120% of its produced-snapshot count plus its
//! signed-snapshot count. The raw works are then clamped against their
//! trimmed average so a runaway node cannot capture the batch, and the
//! clamped works are scaled onto the batch amount with the exact
//! ration/product multiply.
//!
//! Clamp, for `a` the trimmed average and `x` a nonzero raw work:
//!
//!   x ≥ 7a        → 2a
//!   a ≤ x < 7a    → x/6 + 5a/6
//!   a/7 < x < a   → x
//!   x ≤ a/7       → a/7
//!
//! Zero-work nodes stay at zero: they keep their output slot but earn
//! nothing this batch.

use std::collections::HashMap;

use cinder_core::{Address, Amount, Hash32, RoundSpace, NS_PER_DAY};
use tracing::debug;

use crate::error::KernelError;
use crate::Node;

/// An active consensus node as the mint path sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CNode {
    pub id_for_network: Hash32,
    pub signer: Address,
    pub payee: Address,
    /// Nanosecond timestamp at which the node joined the accepted set.
    pub accepted_at: u64,
}

/// A consensus node with its work share for one batch.
#[derive(Clone, Debug)]
pub struct CNodeWork {
    pub node: CNode,
    pub work: Amount,
}

impl Node {
    /// Work statistics for every accepted node on the day of `batch`.
    pub fn list_mint_works(&self, batch: u64) -> Result<HashMap<Hash32, [u64; 2]>, KernelError> {
        let now = self.epoch + batch * NS_PER_DAY;
        let cids: Vec<Hash32> = self
            .nodes_list_without_state(now, true)
            .iter()
            .map(|n| n.id_for_network)
            .collect();
        let day = (now / NS_PER_DAY) as u32;
        Ok(self.store().list_node_works(&cids, day)?)
    }

    /// Round spaces for each node on day `day`.
    pub fn list_round_spaces(
        &self,
        cids: &[Hash32],
        day: u64,
    ) -> Result<HashMap<Hash32, Vec<RoundSpace>>, KernelError> {
        let epoch_day = self.epoch / NS_PER_DAY;
        let batch = day - epoch_day;
        let mut spaces = HashMap::with_capacity(cids.len());
        for id in cids {
            let ns = self.store().read_node_round_spaces_for_batch(id, batch)?;
            spaces.insert(*id, ns);
        }
        Ok(spaces)
    }

    /// Both aggregators must have caught up to `day` on at least `threshold`
    /// nodes before the previous day's statistics are trusted.
    fn validate_works_and_spaces_aggregator(
        &self,
        cids: &[Hash32],
        threshold: usize,
        day: u64,
    ) -> Result<(), KernelError> {
        let works = self.store().list_node_works(cids, day as u32)?;
        let works_agg = works.values().filter(|w| w[0] > 0).count();
        if works_agg < threshold {
            return Err(KernelError::NotReady(format!(
                "works aggregator {day} {}/{works_agg}/{threshold}",
                works.len()
            )));
        }

        let spaces = self
            .store()
            .list_aggregated_round_space_checkpoints(cids)?;
        let epoch_day = self.epoch / NS_PER_DAY;
        let batch = day - epoch_day;
        let spaces_agg = spaces.iter().filter(|s| s.batch >= batch).count();
        if spaces_agg < threshold || works_agg != spaces_agg {
            return Err(KernelError::NotReady(format!(
                "spaces aggregator {batch} {}/{spaces_agg}/{works_agg}/{threshold}",
                spaces.len()
            )));
        }
        Ok(())
    }

    /// Split `base` across the accepted nodes for the day of `timestamp`.
    ///
    /// The first batch after genesis has no prior-day statistics, so it is
    /// split evenly. Every later batch requires the aggregators to be
    /// ready; otherwise a transient [`KernelError::NotReady`] tells the
    /// caller to retry next tick.
    ///
    /// # Panics
    /// Panics if `timestamp` predates the epoch — the caller gated on the
    /// epoch already, so this indicates a corrupted clock or store.
    pub fn distribute_kernel_mint_by_works(
        &self,
        accepted: &[CNode],
        base: Amount,
        timestamp: u64,
    ) -> Result<Vec<CNodeWork>, KernelError> {
        let mut mints: Vec<CNodeWork> = accepted
            .iter()
            .map(|n| CNodeWork {
                node: n.clone(),
                work: Amount::ZERO,
            })
            .collect();
        let cids: Vec<Hash32> = accepted.iter().map(|n| n.id_for_network).collect();

        let epoch_day = self.epoch / NS_PER_DAY;
        let day = timestamp / NS_PER_DAY;
        if day < epoch_day {
            panic!("invalid mint day {epoch_day} {day}");
        }
        if day == epoch_day {
            let work = base.div(mints.len() as u64);
            for m in &mut mints {
                m.work = work;
            }
            return Ok(mints);
        }

        let threshold = self.consensus_threshold(timestamp);
        self.validate_works_and_spaces_aggregator(&cids, threshold, day)?;

        let works = self.store().list_node_works(&cids, (day - 1) as u32)?;
        let spaces = self.list_round_spaces(&cids, day - 1)?;

        let mut valid = 0u64;
        let mut min_w = Amount::ZERO;
        let mut max_w = Amount::ZERO;
        let mut total_w = Amount::ZERO;
        for m in &mut mints {
            if let Some(ns) = spaces.get(&m.node.id_for_network) {
                if !ns.is_empty() {
                    debug!(
                        node = %m.node.id_for_network,
                        batch = ns[0].batch,
                        count = ns.len(),
                        "node round spaces"
                    );
                }
            }

            let w = works
                .get(&m.node.id_for_network)
                .copied()
                .unwrap_or([0, 0]);
            m.work = Amount::new(w[0]).mul(120).div(100);
            let signed = Amount::new(w[1]);
            if signed.sign() > 0 {
                m.work = m.work.add(signed);
            }
            if m.work.sign() == 0 {
                continue;
            }
            valid += 1;
            if min_w.sign() == 0 || m.work < min_w {
                min_w = m.work;
            }
            if m.work > max_w {
                max_w = m.work;
            }
            total_w = total_w.add(m.work);
        }
        // A two-node statistic has no interior once min and max are
        // dropped, so it is as unusable as an under-threshold one.
        if (valid as usize) < threshold || valid <= 2 {
            return Err(KernelError::NotReady(format!(
                "insufficient valid works {day} {}/{threshold}/{valid}",
                mints.len()
            )));
        }

        total_w = total_w.sub(min_w).sub(max_w);
        let avg = total_w.div(valid - 2);
        if avg.sign() == 0 {
            return Err(KernelError::NotReady(format!(
                "zero average work {day} {}/{threshold}/{valid}",
                mints.len()
            )));
        }

        let mut total_w = Amount::ZERO;
        for m in &mut mints {
            if m.work.sign() == 0 {
                continue;
            }
            m.work = clamp_against_average(m.work, avg);
            total_w = total_w.add(m.work);
        }

        for m in &mut mints {
            m.work = m.work.ration(total_w).product(base);
        }
        Ok(mints)
    }
}

/// The piecewise clamp documented in the module header. `work` must be
/// nonzero; zero-work nodes never reach the clamp. The middle branch is a
/// single division `(x + 5a)/6` so the average itself is a fixed point.
pub(crate) fn clamp_against_average(work: Amount, avg: Amount) -> Amount {
    let upper = avg.mul(7);
    let lower = avg.div(7);
    if work >= upper {
        avg.mul(2)
    } else if work >= avg {
        work.add(avg.mul(5)).div(6)
    } else if work <= lower {
        lower
    } else {
        work
    }
}
