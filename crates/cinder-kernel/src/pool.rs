//! Mint pool sizing.
//!
//! Each protocol year reserves one tenth of the remaining pool as that
//! year's budget, and each year is divided into 365 daily batches. Two
//! variants exist: the universal schedule spends the full daily share,
//! while the legacy schedule spends only 9/10 of it (the light-node pool
//! reservation). These functions are pure and every division floors, so
//! all nodes derive identical values from a batch index alone.

use cinder_core::{
    Amount, MINT_LIQUIDITY, MINT_NODE_MAXIMUM, MINT_POOL, MINT_YEAR_BATCHES, MINT_YEAR_SHARES,
    NS_PER_DAY,
};
use serde::{Deserialize, Serialize};

/// Issuance parameters. Production uses [`MintConfig::default`]; tests vary
/// the fields freely.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintConfig {
    pub pool: Amount,
    pub liquidity: Amount,
    pub year_shares: u64,
    pub year_batches: u64,
    pub node_maximum: u64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            pool: Amount::new(MINT_POOL),
            liquidity: Amount::new(MINT_LIQUIDITY),
            year_shares: MINT_YEAR_SHARES,
            year_batches: MINT_YEAR_BATCHES,
            node_maximum: MINT_NODE_MAXIMUM,
        }
    }
}

/// Remaining pool at the start of batch `batch` under the universal
/// schedule.
pub fn pool_size_universal(config: &MintConfig, batch: u64) -> Amount {
    let mut minted = Amount::ZERO;
    let mut pool = config.pool;
    for _ in 0..batch / config.year_batches {
        let year = pool.div(config.year_shares);
        minted = minted.add(year);
        pool = pool.sub(year);
    }
    let day = pool.div(config.year_shares).div(config.year_batches);
    let count = batch % config.year_batches;
    if count > 0 {
        minted = minted.add(day.mul(count));
    }
    remaining(config, minted)
}

/// Remaining pool at the start of batch `batch` under the legacy schedule,
/// which only spends 9/10 of each increment.
pub fn pool_size_legacy(config: &MintConfig, batch: u64) -> Amount {
    let mut minted = Amount::ZERO;
    let mut pool = config.pool;
    for _ in 0..batch / config.year_batches {
        let year = pool.div(config.year_shares);
        minted = minted.add(year.div(10).mul(9));
        pool = pool.sub(year);
    }
    let day = pool.div(config.year_shares).div(config.year_batches);
    let count = batch % config.year_batches;
    if count > 0 {
        minted = minted.add(day.div(10).mul(9).mul(count));
    }
    remaining(config, minted)
}

fn remaining(config: &MintConfig, minted: Amount) -> Amount {
    if minted.sign() == 0 {
        return config.pool;
    }
    if minted > config.pool {
        return Amount::ZERO;
    }
    config.pool.sub(minted)
}

/// Pledge required of a joining node after `since_epoch` nanoseconds of
/// network lifetime: the liquidity accumulator grows by each elapsed
/// year's share, divided by the maximum node count.
pub fn pledge_amount(config: &MintConfig, since_epoch: u64) -> Amount {
    let batch = since_epoch / NS_PER_DAY;
    let mut liquidity = config.liquidity;
    let mut pool = config.pool;
    for _ in 0..batch / config.year_batches {
        let share = pool.div(config.year_shares);
        liquidity = liquidity.add(share);
        pool = pool.sub(share);
    }
    liquidity.div(config.node_maximum)
}
