//! Identifier aliases shared across the consensus core.

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;

/// A block's identifying hash, computed over its header.
pub type BlockId = Hash256;

/// `H(parent_coin_info || puzzle_hash || amount_be_minimal)`.
pub type CoinId = Hash256;

/// An optional 32-byte tag attached to a CREATE_COIN condition, letting
/// wallets index coins by something other than puzzle hash.
pub type Hint = Hash256;

/// Canonical block height. Genesis is height 0.
pub type BlockHeight = u32;

/// Accumulated proof-of-space/time work along a chain; monotonic along any
/// parent chain and used to compare branches.
pub type Weight = u128;

/// Total VDF iterations elapsed since genesis along a chain.
pub type TotalIters = u128;

/// A coin's native unit amount.
pub type Amount = u64;

/// Unix timestamp, seconds.
pub type Timestamp = u64;

/// A reference to a previously created coin, identified by its `coin_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoinRef {
    pub coin_id: CoinId,
}

impl CoinRef {
    #[must_use]
    pub const fn new(coin_id: CoinId) -> Self {
        Self { coin_id }
    }
}
