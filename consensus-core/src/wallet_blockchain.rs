//! The light-client engine: ingests header blocks summarized by an
//! already-validated weight proof instead of running body validation
//! against a coin store. Shares `BlockRecord`, `HeightMap`, and
//! `AddBlockOutcome` with the full node's [`Blockchain`](crate::blockchain::Blockchain).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use consensus_types::{BlockHeight, BlockId, ConsensusConstants, ConsensusError};
use tokio::sync::RwLock;
use tracing::info;

use crate::block_record::{AddBlockOutcome, BlockRecord, StateChangeSummary};
use crate::height_map::HeightMap;
use crate::interfaces::{WeightProof, WeightProofVerifier};
use crate::priority_mutex::{Priority, PriorityMutex};

struct WalletState {
    height_map: HeightMap,
    peak: Option<BlockRecord>,
    block_records: HashMap<BlockId, BlockRecord>,
    heights_in_cache: HashMap<BlockHeight, HashSet<BlockId>>,
}

/// A reduced engine for clients that never see full blocks. `add_block`
/// skips pre-validation and body validation entirely: the caller has
/// already obtained a validated weight proof and its summarized records.
pub struct WalletBlockchain {
    constants: ConsensusConstants,
    weight_proof_verifier: Arc<dyn WeightProofVerifier>,
    lock: PriorityMutex,
    state: RwLock<WalletState>,
}

impl WalletBlockchain {
    #[must_use]
    pub fn new(constants: ConsensusConstants, weight_proof_verifier: Arc<dyn WeightProofVerifier>) -> Self {
        Self {
            constants,
            weight_proof_verifier,
            lock: PriorityMutex::new(),
            state: RwLock::new(WalletState {
                height_map: HeightMap::new(),
                peak: None,
                block_records: HashMap::new(),
                heights_in_cache: HashMap::new(),
            }),
        }
    }

    pub async fn get_peak(&self) -> Option<BlockRecord> {
        self.state.read().await.peak.clone()
    }

    pub async fn get_peak_height(&self) -> Option<BlockHeight> {
        self.state.read().await.peak.as_ref().map(|p| p.height)
    }

    pub async fn height_to_hash(&self, height: BlockHeight) -> Option<BlockId> {
        self.state.read().await.height_map.get_hash(height)
    }

    /// Validates `weight_proof` and admits every record it attests to,
    /// advancing the peak to the heaviest one. Records at or below the
    /// current peak's height are skipped rather than re-admitted.
    pub async fn add_block(&self, weight_proof: WeightProof) -> Result<AddBlockOutcome, ConsensusError> {
        let _permit = self.lock.acquire(Priority::High).await;

        let records = self.weight_proof_verifier.validate_weight_proof(&weight_proof).await?;
        let Some(tip) = records.last().cloned() else {
            return Ok(AddBlockOutcome::Invalid(ConsensusError::InvalidBlockHash));
        };

        let mut state = self.state.write().await;

        if state.block_records.contains_key(&tip.header_hash) {
            return Ok(AddBlockOutcome::AlreadyHave);
        }
        if tip.height == 0 && tip.prev_hash != self.constants.genesis_challenge {
            return Ok(AddBlockOutcome::Invalid(ConsensusError::InvalidGenesisPrevHash));
        }

        let is_heavier = state.peak.as_ref().map_or(true, |peak| tip.weight > peak.weight);
        if !is_heavier {
            for record in &records {
                state.block_records.insert(record.header_hash, record.clone());
                state
                    .heights_in_cache
                    .entry(record.height)
                    .or_default()
                    .insert(record.header_hash);
            }
            return Ok(AddBlockOutcome::Orphan);
        }

        for record in &records {
            state.height_map.update_height(record.height, record.header_hash, None);
            state.block_records.insert(record.header_hash, record.clone());
            state
                .heights_in_cache
                .entry(record.height)
                .or_default()
                .insert(record.header_hash);
        }
        state.peak = Some(tip.clone());

        info!(height = tip.height, hash = %tip.header_hash, "wallet peak advanced via weight proof");

        Ok(AddBlockOutcome::NewPeak(StateChangeSummary {
            peak: tip,
            fork_height: -1,
            rolled_back_records: Vec::new(),
            removals: Vec::new(),
            additions: Vec::new(),
            new_rewards: Vec::new(),
        }))
    }
}
