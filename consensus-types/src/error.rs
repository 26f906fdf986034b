use thiserror::Error;

use crate::hash::Hash256;

/// A candidate block fails one of the consensus rules checked during
/// pre-validation or body validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("block hash does not match its header")]
    InvalidBlockHash,

    #[error("proof of space failed verification")]
    InvalidProofOfSpace,

    #[error("aggregate signature failed verification")]
    InvalidSignature,

    #[error("block cost {cost} exceeds the maximum of {max}")]
    CostExceedsMax { cost: u64, max: u64 },

    #[error("coin {0} was already spent on this fork")]
    DoubleSpend(Hash256),

    #[error("coin {0} is not a known unspent coin")]
    UnknownUnspentCoin(Hash256),

    #[error("reward coins do not match the epoch schedule for this height")]
    RewardMismatch,

    #[error("a removal violates a timelock condition")]
    TimelockViolation,

    #[error("expected block at height {expected}, got {actual}")]
    InvalidHeight { expected: u32, actual: u32 },

    #[error("block timestamp is not valid relative to its ancestors")]
    InvalidTimestamp,

    #[error("generator reference at height {height} does not point at a transaction block")]
    GeneratorRefHasNoGenerator { height: u32 },

    #[error("block's previous hash is not the genesis challenge")]
    InvalidGenesisPrevHash,

    #[error("storage failure: {0}")]
    Storage(String),
}

/// A failure in the storage layer (the coin store, block store, or height
/// map), or a violated invariant that a debug build would otherwise assert
/// on. These propagate through `Result::Err` rather than being recovered
/// locally by the engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("spend updated {actual} rows, expected {expected}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("consistency violation: {0}")]
    ConsistencyError(String),

    #[error("the pre-validation pool has been shut down")]
    PoolShutDown,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("invalid hex string")]
    InvalidHex,

    #[error("decoded bytes were not 32 bytes long")]
    WrongLength,
}
