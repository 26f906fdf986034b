//! The per-fork running set of additions and removals, letting the engine
//! validate a candidate block against a side branch without re-executing
//! scripts on the main chain.

use std::collections::HashMap;

use consensus_types::{BlockHeight, BlockId, CoinId, Hint, Timestamp};

use crate::block_record::Coin;

/// A coin added on the fork being tracked, not yet part of the main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkAddition {
    pub coin: Coin,
    pub confirmed_height: BlockHeight,
    pub timestamp: Timestamp,
    pub is_coinbase: bool,
    pub hint: Option<Hint>,
}

/// A coin removed on the fork being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkRemoval {
    pub height: BlockHeight,
    pub puzzle_hash: BlockId,
}

/// Caller-owned, engine-mutated transient state for one fork branch. Reused
/// across successive `add_block` calls on the same branch so each call only
/// pays for the blocks since the previous one.
#[derive(Debug, Clone, Default)]
pub struct ForkInfo {
    /// -1 means the fork starts from genesis.
    pub fork_height: i64,
    pub peak_height: BlockHeight,
    pub peak_hash: BlockId,
    pub block_hashes: Vec<BlockId>,
    pub additions_since_fork: HashMap<CoinId, ForkAddition>,
    pub removals_since_fork: HashMap<CoinId, ForkRemoval>,
}

impl ForkInfo {
    #[must_use]
    pub fn new(fork_height: i64, peak_height: BlockHeight, peak_hash: BlockId) -> Self {
        Self {
            fork_height,
            peak_height,
            peak_hash,
            block_hashes: Vec::new(),
            additions_since_fork: HashMap::new(),
            removals_since_fork: HashMap::new(),
        }
    }

    /// Records a transaction block's additions and removals, advancing the
    /// fork's tip. Does not re-execute scripts: the caller has already
    /// computed `additions`/`removals` via body validation.
    pub fn include_spends(
        &mut self,
        header_hash: BlockId,
        block_height: BlockHeight,
        timestamp: Timestamp,
        additions: &[(Coin, bool, Option<Hint>)],
        removals: &[(CoinId, BlockId)],
    ) {
        for (coin, is_coinbase, hint) in additions {
            self.additions_since_fork.insert(
                coin.coin_id(),
                ForkAddition {
                    coin: *coin,
                    confirmed_height: block_height,
                    timestamp,
                    is_coinbase: *is_coinbase,
                    hint: *hint,
                },
            );
        }
        for (coin_id, puzzle_hash) in removals {
            self.removals_since_fork.insert(
                *coin_id,
                ForkRemoval {
                    height: block_height,
                    puzzle_hash: *puzzle_hash,
                },
            );
        }
        self.peak_height = block_height;
        self.peak_hash = header_hash;
        self.block_hashes.push(header_hash);
    }

    /// Collapses the fork onto the main chain at `peak_height`/`peak_hash`,
    /// discarding all tracked additions/removals.
    pub fn reset(&mut self, peak_height: BlockHeight, peak_hash: BlockId) {
        self.fork_height = peak_height as i64;
        self.peak_height = peak_height;
        self.peak_hash = peak_hash;
        self.block_hashes.clear();
        self.additions_since_fork.clear();
        self.removals_since_fork.clear();
    }

    /// Whether `coin_id` was added on this fork since its fork point.
    #[must_use]
    pub fn contains_addition(&self, coin_id: &CoinId) -> bool {
        self.additions_since_fork.contains_key(coin_id)
    }

    /// Whether `coin_id` was removed on this fork since its fork point.
    #[must_use]
    pub fn contains_removal(&self, coin_id: &CoinId) -> bool {
        self.removals_since_fork.contains_key(coin_id)
    }
}
