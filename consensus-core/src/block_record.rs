//! The data model shared by every component in this crate: `BlockRecord`,
//! `Coin`, `CoinRecord`, and the tagged outcome of `add_block`.

use serde::{Deserialize, Serialize};

use consensus_types::{Amount, BlockHeight, BlockId, CoinId, ConsensusError, Hint, Timestamp, TotalIters, Weight};

/// An in-memory summary of a validated block: everything the engine needs
/// to order and classify blocks without holding the full block body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub header_hash: BlockId,
    pub prev_hash: BlockId,
    pub height: BlockHeight,
    pub weight: Weight,
    pub total_iters: TotalIters,

    pub sub_slot_iters: u64,
    pub required_iters: u64,
    pub deficit: u8,
    pub overflow: bool,
    pub first_in_sub_slot: bool,

    pub sub_epoch_summary_included: bool,

    pub is_transaction_block: bool,
    /// Present iff `is_transaction_block`.
    pub timestamp: Option<Timestamp>,
    /// Header hashes of the reward-claim coins' parent transaction blocks.
    pub reward_claims: Vec<BlockId>,

    pub challenge_chain_hash: BlockId,
    pub signage_point_hash: BlockId,
}

impl BlockRecord {
    /// Whether this record extends `genesis_challenge` directly, i.e. is
    /// itself the genesis block.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

/// A leaf coin: the spendable value produced by a transaction or a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub parent_coin_info: BlockId,
    pub puzzle_hash: BlockId,
    pub amount: Amount,
}

impl Coin {
    #[must_use]
    pub fn new(parent_coin_info: BlockId, puzzle_hash: BlockId, amount: Amount) -> Self {
        Self {
            parent_coin_info,
            puzzle_hash,
            amount,
        }
    }

    /// `coin_id = H(parent || puzzle_hash || amount_be_minimal)`. The amount
    /// is encoded as its minimal big-endian representation, dropping leading
    /// zero bytes the way CLVM's atom encoding does, so two coins that
    /// differ only in representation width still collide correctly.
    #[must_use]
    pub fn coin_id(&self) -> CoinId {
        let amount_be = self.amount.to_be_bytes();
        let minimal = minimal_be(&amount_be);
        CoinId::hash_parts(&[
            self.parent_coin_info.as_bytes(),
            self.puzzle_hash.as_bytes(),
            minimal,
        ])
    }
}

fn minimal_be(bytes: &[u8; 8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(idx) => &bytes[idx..],
        None => &bytes[7..], // a single zero byte represents amount == 0
    }
}

/// The stored form of a coin: its creation and (if any) spend height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub coin: Coin,
    pub confirmed_block_index: BlockHeight,
    /// 0 means unspent.
    pub spent_block_index: BlockHeight,
    pub coinbase: bool,
    pub timestamp: Timestamp,
}

impl CoinRecord {
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.spent_block_index != 0
    }

    #[must_use]
    pub fn coin_id(&self) -> CoinId {
        self.coin.coin_id()
    }
}

/// The outcome of `Blockchain::add_block`, replacing a dynamic
/// `(result, error?, summary?)` tuple with a single tagged sum.
#[derive(Debug, Clone, PartialEq)]
pub enum AddBlockOutcome {
    /// The block extended the heaviest chain and became the new tip.
    NewPeak(StateChangeSummary),
    /// The block was stored but did not become the tip.
    Orphan,
    /// The block was already known.
    AlreadyHave,
    /// The block's previous hash is unknown.
    Disconnected,
    /// The block failed a consensus rule; nothing was persisted.
    Invalid(ConsensusError),
}

/// Returned only when `add_block` produces `AddBlockOutcome::NewPeak`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeSummary {
    pub peak: BlockRecord,
    pub fork_height: i64,
    pub rolled_back_records: Vec<CoinRecord>,
    pub removals: Vec<(CoinId, BlockId)>,
    pub additions: Vec<(Coin, Option<Hint>)>,
    pub new_rewards: Vec<Coin>,
}

/// The consensus-relevant projection of a candidate block handed to
/// `add_block`: everything body validation and `BlockRecord` construction
/// need. The wire format a full node receives blocks in is out of scope;
/// this is the shape the engine itself operates on once a block has been
/// deserialized by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBlock {
    pub header_hash: BlockId,
    pub prev_hash: BlockId,
    pub height: BlockHeight,
    pub weight: Weight,
    pub total_iters: TotalIters,

    pub sub_slot_iters: u64,
    pub required_iters: u64,
    pub deficit: u8,
    pub overflow: bool,
    pub first_in_sub_slot: bool,

    pub is_transaction_block: bool,
    pub timestamp: Option<Timestamp>,

    pub reward_coins: Vec<Coin>,
    /// Non-reward coins created by this block's transactions, with their
    /// optional hint.
    pub tx_additions: Vec<(Coin, Option<Hint>)>,
    /// Coins spent by this block's transactions.
    pub tx_removals: Vec<CoinId>,
    /// Aggregate CLVM cost of this block's transactions generator, if any.
    pub cost: u64,

    pub challenge_chain_hash: BlockId,
    pub signage_point_hash: BlockId,
}

impl CandidateBlock {
    #[must_use]
    pub fn to_block_record(&self) -> BlockRecord {
        BlockRecord {
            header_hash: self.header_hash,
            prev_hash: self.prev_hash,
            height: self.height,
            weight: self.weight,
            total_iters: self.total_iters,
            sub_slot_iters: self.sub_slot_iters,
            required_iters: self.required_iters,
            deficit: self.deficit,
            overflow: self.overflow,
            first_in_sub_slot: self.first_in_sub_slot,
            sub_epoch_summary_included: false,
            is_transaction_block: self.is_transaction_block,
            timestamp: self.timestamp,
            reward_claims: self.reward_coins.iter().map(Coin::coin_id).collect(),
            challenge_chain_hash: self.challenge_chain_hash,
            signage_point_hash: self.signage_point_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(amount: u64) -> Coin {
        Coin::new(BlockId::hash(b"parent"), BlockId::hash(b"puzzle"), amount)
    }

    #[test]
    fn coin_id_is_deterministic() {
        let a = coin(100);
        let b = coin(100);
        assert_eq!(a.coin_id(), b.coin_id());
    }

    #[test]
    fn coin_id_distinguishes_amount() {
        assert_ne!(coin(100).coin_id(), coin(101).coin_id());
    }

    #[test]
    fn coin_id_ignores_amount_representation_width() {
        // A 0-amount coin's minimal encoding is a single zero byte either way.
        let zero_a = Coin::new(BlockId::zero(), BlockId::zero(), 0);
        let zero_b = Coin::new(BlockId::zero(), BlockId::zero(), 0);
        assert_eq!(zero_a.coin_id(), zero_b.coin_id());
    }

    #[test]
    fn unspent_record_has_zero_spent_index() {
        let record = CoinRecord {
            coin: coin(5),
            confirmed_block_index: 10,
            spent_block_index: 0,
            coinbase: false,
            timestamp: 0,
        };
        assert!(!record.is_spent());
    }
}
