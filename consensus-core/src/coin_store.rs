//! Height-indexed unspent-coin database. Conceptually a single table keyed
//! by `coin_id` with secondary indexes on `confirmed_index`, `spent_index`,
//! `puzzle_hash`, and `parent`; implemented here as an in-process map with
//! those same indexes maintained incrementally, so every query below costs
//! what the equivalent indexed SQL query would.

use std::collections::{BTreeMap, HashMap, HashSet};

use consensus_types::{Amount, BlockHeight, CoinId, Hint, StorageError, Timestamp};

use crate::block_record::{Coin, CoinRecord};

/// Large `IN (...)` lookups are chunked at this size, mirroring SQLite's
/// default `SQLITE_MAX_VARIABLE_NUMBER` host-parameter limit, so the batching
/// behavior here matches a relational-backed implementation's cost profile.
pub const QUERY_BATCH_SIZE: usize = 999;

#[derive(Debug, Default)]
struct Indexes {
    by_confirmed_height: BTreeMap<BlockHeight, HashSet<CoinId>>,
    by_spent_height: BTreeMap<BlockHeight, HashSet<CoinId>>,
    by_puzzle_hash: HashMap<Hint, HashSet<CoinId>>,
    by_parent: HashMap<Hint, HashSet<CoinId>>,
}

/// The unspent-coin database: additions, spend-height updates, and
/// arbitrary-depth rollback, keyed by `coin_id`.
#[derive(Debug, Default)]
pub struct CoinStore {
    rows: HashMap<CoinId, CoinRecord>,
    hints: HashMap<CoinId, Hint>,
    indexes: Indexes,
}

/// One coin to insert as part of `new_block`, with its optional hint.
#[derive(Debug, Clone, Copy)]
pub struct NewCoin {
    pub coin: Coin,
    pub is_coinbase: bool,
    pub hint: Option<Hint>,
}

impl CoinStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn num_unspent(&self) -> usize {
        self.rows.values().filter(|r| !r.is_spent()).count()
    }

    #[must_use]
    pub fn get_coin_record(&self, coin_id: &CoinId) -> Option<CoinRecord> {
        self.rows.get(coin_id).copied()
    }

    #[must_use]
    pub fn get_coin_records(&self, coin_ids: &[CoinId]) -> Vec<CoinRecord> {
        coin_ids
            .chunks(QUERY_BATCH_SIZE)
            .flat_map(|batch| batch.iter().filter_map(|id| self.rows.get(id).copied()))
            .collect()
    }

    #[must_use]
    pub fn get_coins_added_at_height(&self, height: BlockHeight) -> Vec<CoinRecord> {
        self.indexes
            .by_confirmed_height
            .get(&height)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rows.get(id).copied())
            .collect()
    }

    #[must_use]
    pub fn get_coins_removed_at_height(&self, height: BlockHeight) -> Vec<CoinRecord> {
        if height == 0 {
            return Vec::new();
        }
        self.indexes
            .by_spent_height
            .get(&height)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rows.get(id).copied())
            .collect()
    }

    #[must_use]
    pub fn get_coin_records_by_puzzle_hash(
        &self,
        puzzle_hash: &Hint,
        min_height: BlockHeight,
    ) -> Vec<CoinRecord> {
        self.indexes
            .by_puzzle_hash
            .get(puzzle_hash)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rows.get(id).copied())
            .filter(|r| r.confirmed_block_index >= min_height)
            .collect()
    }

    #[must_use]
    pub fn get_coin_records_by_parent_ids(&self, parent_ids: &[Hint]) -> Vec<CoinRecord> {
        parent_ids
            .chunks(QUERY_BATCH_SIZE)
            .flat_map(|batch| {
                batch.iter().flat_map(|parent| {
                    self.indexes
                        .by_parent
                        .get(parent)
                        .into_iter()
                        .flatten()
                        .filter_map(|id| self.rows.get(id).copied())
                })
            })
            .collect()
    }

    #[must_use]
    pub fn get_coin_records_by_hint(&self, hint: &Hint) -> Vec<CoinRecord> {
        self.hints
            .iter()
            .filter(|(_, h)| *h == hint)
            .filter_map(|(id, _)| self.rows.get(id).copied())
            .collect()
    }

    /// Inserts the reward and transaction coins created at `height` with
    /// `spent_index = 0`, then marks exactly the rows in `tx_removals` as
    /// spent at `height`. If the number of rows actually updated differs
    /// from `tx_removals.len()`, the whole call is rolled back and a
    /// `RowCountMismatch` is returned; this is the double-spend / unknown-
    /// coin-spend detector.
    ///
    /// Height 0 must create no reward coins and remove nothing.
    pub fn new_block(
        &mut self,
        height: BlockHeight,
        timestamp: Timestamp,
        reward_coins: &[Coin],
        tx_additions: &[NewCoin],
        tx_removals: &[CoinId],
    ) -> Result<(), StorageError> {
        if height == 0 && (!reward_coins.is_empty() || !tx_removals.is_empty()) {
            return Err(StorageError::ConsistencyError(
                "height 0 may not have reward coins or removals".to_string(),
            ));
        }

        // Stage the update first so a row-count mismatch rolls back cleanly
        // without having mutated `self` at all.
        let mut to_spend = Vec::with_capacity(tx_removals.len());
        for coin_id in tx_removals {
            match self.rows.get(coin_id) {
                Some(record) if !record.is_spent() => to_spend.push(*coin_id),
                _ => continue,
            }
        }
        if to_spend.len() != tx_removals.len() {
            return Err(StorageError::RowCountMismatch {
                expected: tx_removals.len(),
                actual: to_spend.len(),
            });
        }

        for reward in reward_coins {
            self.insert_row(
                CoinRecord {
                    coin: *reward,
                    confirmed_block_index: height,
                    spent_block_index: 0,
                    coinbase: true,
                    timestamp,
                },
                None,
            );
        }
        for addition in tx_additions {
            self.insert_row(
                CoinRecord {
                    coin: addition.coin,
                    confirmed_block_index: height,
                    spent_block_index: 0,
                    coinbase: addition.is_coinbase,
                    timestamp,
                },
                addition.hint,
            );
        }

        for coin_id in &to_spend {
            self.mark_spent(coin_id, height);
        }

        Ok(())
    }

    /// Returns every `CoinRecord` whose state is about to change, deletes
    /// rows created after `height`, and clears the spend marker of rows
    /// spent after `height`.
    pub fn rollback_to_block(&mut self, height: BlockHeight) -> Vec<CoinRecord> {
        let mut changed = Vec::new();

        let created_after: Vec<CoinId> = self
            .indexes
            .by_confirmed_height
            .range((height + 1)..)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in created_after {
            if let Some(record) = self.remove_row(&id) {
                changed.push(record);
            }
        }

        let spent_after: Vec<CoinId> = self
            .indexes
            .by_spent_height
            .range((height + 1)..)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in spent_after {
            if let Some(record) = self.rows.get(&id).copied() {
                changed.push(record);
            }
            self.unmark_spent(&id);
        }

        changed
    }

    fn insert_row(&mut self, record: CoinRecord, hint: Option<Hint>) {
        let id = record.coin_id();
        self.indexes
            .by_confirmed_height
            .entry(record.confirmed_block_index)
            .or_default()
            .insert(id);
        self.indexes
            .by_puzzle_hash
            .entry(record.coin.puzzle_hash)
            .or_default()
            .insert(id);
        self.indexes
            .by_parent
            .entry(record.coin.parent_coin_info)
            .or_default()
            .insert(id);
        if let Some(hint) = hint {
            self.hints.insert(id, hint);
        }
        self.rows.insert(id, record);
    }

    fn remove_row(&mut self, id: &CoinId) -> Option<CoinRecord> {
        let record = self.rows.remove(id)?;
        if let Some(set) = self
            .indexes
            .by_confirmed_height
            .get_mut(&record.confirmed_block_index)
        {
            set.remove(id);
        }
        if record.is_spent() {
            if let Some(set) = self.indexes.by_spent_height.get_mut(&record.spent_block_index) {
                set.remove(id);
            }
        }
        if let Some(set) = self.indexes.by_puzzle_hash.get_mut(&record.coin.puzzle_hash) {
            set.remove(id);
        }
        if let Some(set) = self.indexes.by_parent.get_mut(&record.coin.parent_coin_info) {
            set.remove(id);
        }
        self.hints.remove(id);
        Some(record)
    }

    fn mark_spent(&mut self, id: &CoinId, height: BlockHeight) {
        if let Some(record) = self.rows.get_mut(id) {
            record.spent_block_index = height;
            self.indexes
                .by_spent_height
                .entry(height)
                .or_default()
                .insert(*id);
        }
    }

    fn unmark_spent(&mut self, id: &CoinId) {
        if let Some(record) = self.rows.get_mut(id) {
            let old_height = record.spent_block_index;
            record.spent_block_index = 0;
            if let Some(set) = self.indexes.by_spent_height.get_mut(&old_height) {
                set.remove(id);
            }
        }
    }
}
