//! Narrow trait boundaries for the collaborators this crate consumes but
//! does not implement: durable full-block storage and weight-proof
//! verification. Signature verification has its own narrow trait in
//! `body_validator`.

use async_trait::async_trait;
use consensus_types::{BlockHeight, BlockId, ConsensusError, StorageError};

use crate::block_record::{BlockRecord, CandidateBlock};

/// A sub-epoch challenge segment blob: opaque to this crate, round-tripped
/// to whatever persists it.
pub type ChallengeSegments = Vec<u8>;

/// Durable storage for full blocks, their records, and transaction
/// generators. Implemented outside this workspace; the engine only ever
/// calls through this trait.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn add_full_block(
        &self,
        hash: BlockId,
        block: &CandidateBlock,
        record: &BlockRecord,
    ) -> Result<(), StorageError>;
    async fn set_in_chain(&self, hashes: &[BlockId]) -> Result<(), StorageError>;
    async fn set_peak(&self, hash: BlockId) -> Result<(), StorageError>;
    async fn rollback(&self, height: BlockHeight) -> Result<(), StorageError>;

    async fn get_full_block(&self, hash: BlockId) -> Result<Option<CandidateBlock>, StorageError>;
    async fn get_blocks_by_hash(&self, hashes: &[BlockId]) -> Result<Vec<CandidateBlock>, StorageError>;
    async fn get_generators_at(&self, heights: &[BlockHeight]) -> Result<Vec<Vec<u8>>, StorageError>;
    async fn get_generator(&self, hash: BlockId) -> Result<Option<Vec<u8>>, StorageError>;

    async fn get_block_record(&self, hash: BlockId) -> Result<Option<BlockRecord>, StorageError>;
    async fn get_block_records_close_to_peak(
        &self,
        n: usize,
    ) -> Result<(Vec<BlockRecord>, Option<BlockId>), StorageError>;
    async fn get_block_records_by_hash(&self, hashes: &[BlockId]) -> Result<Vec<BlockRecord>, StorageError>;
    async fn get_block_records_in_range(
        &self,
        lo: BlockHeight,
        hi: BlockHeight,
    ) -> Result<Vec<BlockRecord>, StorageError>;
    async fn get_prev_hash(&self, hash: BlockId) -> Result<Option<BlockId>, StorageError>;

    async fn persist_sub_epoch_challenge_segments(
        &self,
        hash: BlockId,
        segments: &ChallengeSegments,
    ) -> Result<(), StorageError>;
    async fn get_sub_epoch_challenge_segments(
        &self,
        hash: BlockId,
    ) -> Result<Option<ChallengeSegments>, StorageError>;

    async fn is_fully_compactified(&self, hash: BlockId) -> Result<Option<bool>, StorageError>;
    async fn rollback_cache_block(&self, hash: BlockId) -> Result<(), StorageError>;
}

/// A summarized weight proof, opaque beyond the record list it attests to.
/// Weight-proof construction and cryptographic verification are out of
/// scope for this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightProof {
    pub tip_header_hash: BlockId,
    pub bytes: Vec<u8>,
}

/// Verifies a weight proof and produces the block records it attests to, in
/// ascending height order. Implemented outside this workspace.
#[async_trait]
pub trait WeightProofVerifier: Send + Sync {
    async fn validate_weight_proof(
        &self,
        weight_proof: &WeightProof,
    ) -> Result<Vec<BlockRecord>, ConsensusError>;
}
