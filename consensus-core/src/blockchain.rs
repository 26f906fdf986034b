//! The consensus engine: `add_block`'s classify/validate/commit state
//! machine, peak reconsideration and reorg replay, and the bounded
//! block-record cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use consensus_types::{BlockHeight, BlockId, CoinId, ConsensusConstants, ConsensusError, Hint, StorageError};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::block_record::AddBlockOutcome;
use crate::block_record::{BlockRecord, CandidateBlock, Coin, StateChangeSummary};
use crate::body_validator::{validate_body, SignatureStatus, SignatureValidator};
use crate::coin_store::{CoinStore, NewCoin};
use crate::fork_info::ForkInfo;
use crate::height_map::HeightMap;
use crate::interfaces::BlockStore;
use crate::pre_validation::{PreValidationError, PreValidationPool, PreValidationResult, ValidationJob};
use crate::priority_mutex::{Priority, PriorityMutex};

/// A compact-proof identity: a VDF output paired with the height it was
/// produced at. Full VDF verification is out of scope; the engine only
/// tracks which ones it has already seen.
pub type CompactProofId = (BlockId, BlockHeight);

const SEEN_COMPACT_PROOFS_SOFT_CAP: usize = 10_000;

fn storage_to_consensus(e: StorageError) -> ConsensusError {
    ConsensusError::Storage(e.to_string())
}

fn map_pre_validation_error(e: &PreValidationError) -> ConsensusError {
    match e {
        PreValidationError::BadHeader => ConsensusError::InvalidBlockHash,
        PreValidationError::BadProofOfSpace => ConsensusError::InvalidProofOfSpace,
        PreValidationError::BadVdfShape => ConsensusError::InvalidBlockHash,
        PreValidationError::BadSignature => ConsensusError::InvalidSignature,
    }
}

struct BlockchainState {
    coin_store: CoinStore,
    height_map: HeightMap,
    peak: Option<BlockRecord>,
    block_records: HashMap<BlockId, BlockRecord>,
    heights_in_cache: HashMap<BlockHeight, HashSet<BlockId>>,
}

/// The full-node consensus engine: owns the coin store and height map,
/// serializes mutation through a two-lane priority mutex, and delegates
/// durable full-block storage to a collaborator.
pub struct Blockchain {
    constants: ConsensusConstants,
    block_store: Arc<dyn BlockStore>,
    pre_validation_pool: Arc<dyn PreValidationPool>,
    lock: PriorityMutex,
    state: RwLock<BlockchainState>,
    seen_compact_proofs: tokio::sync::Mutex<HashSet<CompactProofId>>,
}

impl Blockchain {
    #[must_use]
    pub fn new(
        constants: ConsensusConstants,
        block_store: Arc<dyn BlockStore>,
        pre_validation_pool: Arc<dyn PreValidationPool>,
    ) -> Self {
        Self {
            constants,
            block_store,
            pre_validation_pool,
            lock: PriorityMutex::new(),
            state: RwLock::new(BlockchainState {
                coin_store: CoinStore::new(),
                height_map: HeightMap::new(),
                peak: None,
                block_records: HashMap::new(),
                heights_in_cache: HashMap::new(),
            }),
            seen_compact_proofs: tokio::sync::Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn constants(&self) -> &ConsensusConstants {
        &self.constants
    }

    /// Dispatches each block's stateless checks to the pre-validation pool
    /// and collects the results in input order.
    pub async fn pre_validate_blocks(&self, jobs: Vec<ValidationJob>) -> Vec<PreValidationResult> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.pre_validation_pool.dispatch(job).await {
                Ok(result) => results.push(result),
                Err(_) => results.push(PreValidationResult {
                    error: Some(PreValidationError::BadHeader),
                    required_iters: None,
                    validated_signature: false,
                }),
            }
        }
        results
    }

    /// Runs the same stateless checks `pre_validate_blocks` would, for a
    /// single not-yet-finished block (used by the farmer/timelord path
    /// before a signage point has a full block built on top of it).
    pub async fn validate_unfinished_block(&self, job: ValidationJob) -> PreValidationResult {
        self.pre_validation_pool
            .dispatch(job)
            .await
            .unwrap_or(PreValidationResult {
                error: Some(PreValidationError::BadHeader),
                required_iters: None,
                validated_signature: false,
            })
    }

    /// Whether `id` has already been recorded as seen; inserts it if not.
    /// The seen-set is cleared entirely once it exceeds its soft cap rather
    /// than evicting individual entries.
    pub async fn mark_compact_proof_seen(&self, id: CompactProofId) -> bool {
        let mut seen = self.seen_compact_proofs.lock().await;
        if seen.len() > SEEN_COMPACT_PROOFS_SOFT_CAP {
            seen.clear();
        }
        !seen.insert(id)
    }

    /// Populates the block-record cache for heights near `fork_point`, so a
    /// subsequent `add_block` on that fork does not need to query the block
    /// store for every ancestor.
    pub async fn warmup(&self, fork_point: BlockHeight) -> Result<(), ConsensusError> {
        let (records, _) = self
            .block_store
            .get_block_records_close_to_peak(self.constants.blocks_cache_size as usize)
            .await
            .map_err(storage_to_consensus)?;
        let mut state = self.state.write().await;
        for record in records {
            if record.height < fork_point {
                continue;
            }
            state.heights_in_cache.entry(record.height).or_default().insert(record.header_hash);
            state.block_records.insert(record.header_hash, record);
        }
        Ok(())
    }

    /// Resolves a transactions generator reference list for `block`. If
    /// `block`'s parent is on the main chain, references are resolved
    /// directly from the block store; otherwise each reference is looked up
    /// in `additional_blocks` first, falling back to the block store.
    pub async fn get_block_generator(
        &self,
        block: &CandidateBlock,
        generator_ref_heights: &[BlockHeight],
        additional_blocks: &HashMap<BlockId, CandidateBlock>,
    ) -> Result<Vec<Vec<u8>>, ConsensusError> {
        let state = self.state.read().await;
        let on_main_chain = state.height_map.get_hash(block.height.saturating_sub(1)) == Some(block.prev_hash)
            || block.height == 0;

        if on_main_chain {
            return self
                .block_store
                .get_generators_at(generator_ref_heights)
                .await
                .map_err(storage_to_consensus);
        }

        let mut generators = Vec::with_capacity(generator_ref_heights.len());
        for &height in generator_ref_heights {
            let hash = state.height_map.get_hash(height);
            let from_fork = hash.and_then(|h| additional_blocks.get(&h));
            match from_fork {
                Some(candidate) if candidate.is_transaction_block => {
                    // The candidate's own serialized generator bytes are not
                    // modeled on `CandidateBlock`; callers running an actual
                    // CLVM generator would supply them out of band. Fall
                    // through to the durable store, which is authoritative
                    // once the block has been persisted.
                    let generator = self
                        .block_store
                        .get_generator(candidate.header_hash)
                        .await
                        .map_err(storage_to_consensus)?
                        .ok_or(ConsensusError::GeneratorRefHasNoGenerator { height })?;
                    generators.push(generator);
                }
                _ => {
                    let generator = self
                        .block_store
                        .get_generators_at(&[height])
                        .await
                        .map_err(storage_to_consensus)?
                        .into_iter()
                        .next()
                        .ok_or(ConsensusError::GeneratorRefHasNoGenerator { height })?;
                    generators.push(generator);
                }
            }
        }
        Ok(generators)
    }

    /// The timestamp-weighted difficulty-adjustment formula is out of scope
    /// for this crate; this validates that `hash` is known and otherwise
    /// returns the constant starting difficulty, preserving the signature a
    /// real epoch-aware implementation would have.
    pub async fn get_next_difficulty(&self, hash: BlockId, _new_slot: bool) -> Result<u64, ConsensusError> {
        let state = self.state.read().await;
        if !state.block_records.contains_key(&hash) {
            return Err(ConsensusError::InvalidBlockHash);
        }
        Ok(self.constants.difficulty_starting)
    }

    /// See [`Self::get_next_difficulty`]; the same scope limitation applies.
    pub async fn get_next_slot_iters(&self, hash: BlockId, _new_slot: bool) -> Result<u64, ConsensusError> {
        let state = self.state.read().await;
        if !state.block_records.contains_key(&hash) {
            return Err(ConsensusError::InvalidBlockHash);
        }
        Ok(self.constants.sub_slot_iters_starting)
    }

    pub async fn get_full_peak(&self) -> Result<Option<CandidateBlock>, ConsensusError> {
        let Some(peak) = self.get_peak().await else {
            return Ok(None);
        };
        self.block_store
            .get_full_block(peak.header_hash)
            .await
            .map_err(storage_to_consensus)
    }

    pub async fn get_peak(&self) -> Option<BlockRecord> {
        self.state.read().await.peak.clone()
    }

    pub async fn get_peak_height(&self) -> Option<BlockHeight> {
        self.state.read().await.peak.as_ref().map(|p| p.height)
    }

    pub async fn contains_block(&self, hash: BlockId) -> bool {
        self.state.read().await.block_records.contains_key(&hash)
    }

    pub async fn block_record(&self, hash: BlockId) -> Option<BlockRecord> {
        self.state.read().await.block_records.get(&hash).cloned()
    }

    pub async fn height_to_hash(&self, height: BlockHeight) -> Option<BlockId> {
        self.state.read().await.height_map.get_hash(height)
    }

    /// Read-only pass-throughs onto the coin store, exposed the way §4.2
    /// describes: the engine is the only caller that ever sees `CoinStore`
    /// directly.
    pub async fn num_unspent(&self) -> usize {
        self.state.read().await.coin_store.num_unspent()
    }

    pub async fn get_coin_record(&self, coin_id: &CoinId) -> Option<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coin_record(coin_id)
    }

    pub async fn get_coin_records(&self, coin_ids: &[CoinId]) -> Vec<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coin_records(coin_ids)
    }

    pub async fn get_coins_added_at_height(&self, height: BlockHeight) -> Vec<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coins_added_at_height(height)
    }

    pub async fn get_coins_removed_at_height(&self, height: BlockHeight) -> Vec<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coins_removed_at_height(height)
    }

    pub async fn get_coin_records_by_puzzle_hash(
        &self,
        puzzle_hash: &Hint,
        min_height: BlockHeight,
    ) -> Vec<crate::block_record::CoinRecord> {
        self.state
            .read()
            .await
            .coin_store
            .get_coin_records_by_puzzle_hash(puzzle_hash, min_height)
    }

    pub async fn get_coin_records_by_parent_ids(&self, parent_ids: &[Hint]) -> Vec<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coin_records_by_parent_ids(parent_ids)
    }

    pub async fn get_coin_records_by_hint(&self, hint: &Hint) -> Vec<crate::block_record::CoinRecord> {
        self.state.read().await.coin_store.get_coin_records_by_hint(hint)
    }

    /// Advances `fork_info` to account for an already-known block, so the
    /// caller's next sibling on the same fork validates against up-to-date
    /// state without re-deriving the whole chain.
    fn advance_fork_info(&self, fork_info: &mut ForkInfo, record: &BlockRecord, block: &CandidateBlock) {
        if fork_info.block_hashes.contains(&block.header_hash) || record.height <= fork_info.peak_height {
            return;
        }
        let additions = spend_tuples(block);
        let removals = removal_tuples(block, &additions, fork_info, None);
        fork_info.include_spends(
            block.header_hash,
            block.height,
            block.timestamp.unwrap_or(0),
            &additions,
            &removals,
        );
    }

    /// Runs the add-block state machine described for this engine: classify
    /// the block, validate its body under the applicable fork context, then
    /// commit and reconsider the peak, all under one acquisition of the
    /// high-priority lock, so two `add_block` calls never interleave.
    pub async fn add_block(
        &self,
        block: CandidateBlock,
        pre_validation_result: PreValidationResult,
        fork_info: Option<&mut ForkInfo>,
        signature_validator: &dyn SignatureValidator,
    ) -> Result<AddBlockOutcome, ConsensusError> {
        let _permit = self.lock.acquire(Priority::High).await;

        if let Some(error) = &pre_validation_result.error {
            return Ok(AddBlockOutcome::Invalid(map_pre_validation_error(error)));
        }

        let mut state = self.state.write().await;

        if let Some(existing) = state.block_records.get(&block.header_hash).cloned() {
            if let Some(fi) = fork_info {
                self.advance_fork_info(fi, &existing, &block);
            }
            return Ok(AddBlockOutcome::AlreadyHave);
        }

        if block.height == 0 {
            if block.prev_hash != self.constants.genesis_challenge {
                return Ok(AddBlockOutcome::Invalid(ConsensusError::InvalidGenesisPrevHash));
            }
        } else {
            let prev_known = state.block_records.contains_key(&block.prev_hash)
                || self
                    .block_store
                    .get_block_record(block.prev_hash)
                    .await
                    .map_err(storage_to_consensus)?
                    .is_some();
            if !prev_known {
                return Ok(AddBlockOutcome::Disconnected);
            }
        }

        let extending_main_chain = state
            .peak
            .as_ref()
            .is_some_and(|p| block.prev_hash == p.header_hash)
            || (block.height == 0 && state.peak.is_none());

        let mut owned_fork_info;
        let fork_info: &mut ForkInfo = match fork_info {
            Some(fi) => fi,
            None => {
                owned_fork_info = self.empty_fork_info(&state);
                &mut owned_fork_info
            }
        };

        if !extending_main_chain {
            self.build_or_verify_fork_info(&state, fork_info, block.prev_hash).await?;
        }

        let peak_record = state.peak.clone();
        let fork_context = if extending_main_chain { None } else { Some(&*fork_info) };
        if let Err(e) = validate_body(
            &self.constants,
            &state.coin_store,
            fork_context,
            peak_record.as_ref(),
            &block,
            SignatureStatus {
                already_validated: pre_validation_result.validated_signature,
            },
            signature_validator,
        ) {
            return Ok(AddBlockOutcome::Invalid(e));
        }

        let additions = spend_tuples(&block);
        let removals = removal_tuples(&block, &additions, fork_info, Some(&state.coin_store));
        fork_info.include_spends(
            block.header_hash,
            block.height,
            block.timestamp.unwrap_or(0),
            &additions,
            &removals,
        );

        let record = block.to_block_record();
        self.block_store
            .add_full_block(block.header_hash, &block, &record)
            .await
            .map_err(storage_to_consensus)?;

        let summary = self.reconsider_peak(&mut state, fork_info, &block, &record, &removals).await?;

        state.block_records.insert(block.header_hash, record.clone());
        state
            .heights_in_cache
            .entry(block.height)
            .or_default()
            .insert(block.header_hash);
        self.clean_block_records(&mut state);

        match summary {
            Some(summary) => {
                info!(height = record.height, hash = %record.header_hash, "new peak");
                Ok(AddBlockOutcome::NewPeak(summary))
            }
            None => Ok(AddBlockOutcome::Orphan),
        }
    }

    fn empty_fork_info(&self, state: &BlockchainState) -> ForkInfo {
        match &state.peak {
            Some(peak) => ForkInfo::new(peak.height as i64, peak.height, peak.header_hash),
            None => ForkInfo::new(-1, 0, self.constants.genesis_challenge),
        }
    }

    /// Walks backward from `tip_hash` via cached or stored block records
    /// until reaching a hash the `HeightMap` recognizes as canonical, then
    /// replays every block on that path into `fork_info` so body validation
    /// can be checked against the side branch without touching the main
    /// `CoinStore`.
    async fn build_or_verify_fork_info(
        &self,
        state: &BlockchainState,
        fork_info: &mut ForkInfo,
        tip_hash: BlockId,
    ) -> Result<(), ConsensusError> {
        if fork_info.peak_hash == tip_hash {
            return Ok(());
        }

        let mut chain = Vec::new();
        let mut current = tip_hash;
        let fork_height = loop {
            let record = match state.block_records.get(&current) {
                Some(r) => r.clone(),
                None => self
                    .block_store
                    .get_block_record(current)
                    .await
                    .map_err(storage_to_consensus)?
                    .ok_or(ConsensusError::InvalidGenesisPrevHash)?,
            };
            if state.height_map.get_hash(record.height) == Some(current) {
                break record.height as i64;
            }
            chain.push(current);
            if record.height == 0 {
                break -1;
            }
            current = record.prev_hash;
        };
        chain.reverse();

        fork_info.reset(
            fork_height.max(0) as BlockHeight,
            if fork_height < 0 {
                self.constants.genesis_challenge
            } else {
                state
                    .height_map
                    .get_hash(fork_height as BlockHeight)
                    .unwrap_or(self.constants.genesis_challenge)
            },
        );
        fork_info.fork_height = fork_height;

        for hash in chain {
            let full = self
                .block_store
                .get_full_block(hash)
                .await
                .map_err(storage_to_consensus)?
                .ok_or(ConsensusError::InvalidGenesisPrevHash)?;
            let additions = spend_tuples(&full);
            let removals = removal_tuples(&full, &additions, fork_info, Some(&state.coin_store));
            fork_info.include_spends(hash, full.height, full.timestamp.unwrap_or(0), &additions, &removals);
        }

        Ok(())
    }

    /// Decides whether `block` becomes the new peak, rolling the coin store
    /// and height map back to the fork point and replaying the new branch
    /// first if it diverges from the current peak.
    async fn reconsider_peak(
        &self,
        state: &mut BlockchainState,
        fork_info: &ForkInfo,
        block: &CandidateBlock,
        record: &BlockRecord,
        removals: &[(CoinId, BlockId)],
    ) -> Result<Option<StateChangeSummary>, ConsensusError> {
        if block.height == 0 && state.peak.is_some() {
            return Ok(None);
        }
        if let Some(peak) = &state.peak {
            if block.weight <= peak.weight {
                return Ok(None);
            }
        }

        let diverged = state.peak.as_ref().is_some_and(|p| block.prev_hash != p.header_hash);
        let mut rolled_back_records = Vec::new();

        if diverged {
            let fork_height = fork_info.fork_height.max(0) as BlockHeight;
            rolled_back_records = state.coin_store.rollback_to_block(fork_height);
            state.height_map.rollback(fork_height);

            for height in (fork_height + 1)..=block.height {
                let reward_coins: Vec<Coin> = fork_info
                    .additions_since_fork
                    .values()
                    .filter(|a| a.confirmed_height == height && a.is_coinbase)
                    .map(|a| a.coin)
                    .collect();
                let tx_additions: Vec<NewCoin> = fork_info
                    .additions_since_fork
                    .values()
                    .filter(|a| a.confirmed_height == height && !a.is_coinbase)
                    .map(|a| NewCoin {
                        coin: a.coin,
                        is_coinbase: false,
                        hint: a.hint,
                    })
                    .collect();
                let tx_removals: Vec<CoinId> = fork_info
                    .removals_since_fork
                    .iter()
                    .filter(|(_, r)| r.height == height)
                    .map(|(id, _)| *id)
                    .collect();
                let timestamp = fork_info
                    .additions_since_fork
                    .values()
                    .find(|a| a.confirmed_height == height)
                    .map(|a| a.timestamp)
                    .unwrap_or(0);
                state
                    .coin_store
                    .new_block(height, timestamp, &reward_coins, &tx_additions, &tx_removals)
                    .map_err(storage_to_consensus)?;

                let block_hash = fork_info.block_hashes[(height as i64 - fork_info.fork_height - 1) as usize];
                state.height_map.update_height(height, block_hash, None);
            }
        } else if block.is_transaction_block {
            let tx_additions: Vec<NewCoin> = block
                .tx_additions
                .iter()
                .map(|(coin, hint)| NewCoin {
                    coin: *coin,
                    is_coinbase: false,
                    hint: *hint,
                })
                .collect();
            state
                .coin_store
                .new_block(
                    block.height,
                    block.timestamp.unwrap_or(0),
                    &block.reward_coins,
                    &tx_additions,
                    &block.tx_removals,
                )
                .map_err(storage_to_consensus)?;
        }

        let rollback_height = if diverged {
            fork_info.fork_height.max(0) as BlockHeight
        } else {
            block.height.saturating_sub(1)
        };
        self.block_store
            .rollback(rollback_height)
            .await
            .map_err(storage_to_consensus)?;
        self.block_store
            .set_in_chain(&fork_info.block_hashes)
            .await
            .map_err(storage_to_consensus)?;
        self.block_store
            .set_peak(block.header_hash)
            .await
            .map_err(storage_to_consensus)?;

        state.height_map.update_height(block.height, block.header_hash, None);
        state.peak = Some(record.clone());

        Ok(Some(StateChangeSummary {
            peak: record.clone(),
            fork_height: fork_info.fork_height,
            rolled_back_records,
            removals: removals.to_vec(),
            additions: block.tx_additions.clone(),
            new_rewards: block.reward_coins.clone(),
        }))
    }

    /// Evicts cached block records below `peak.height - blocks_cache_size`,
    /// walking heights in descending order and stopping at the first height
    /// with nothing left to evict.
    fn clean_block_records(&self, state: &mut BlockchainState) {
        let Some(peak) = &state.peak else { return };
        let threshold = peak.height.saturating_sub(self.constants.blocks_cache_size);
        if threshold == 0 {
            return;
        }
        let mut height = threshold;
        loop {
            match state.heights_in_cache.remove(&height) {
                Some(hashes) => {
                    for hash in hashes {
                        state.block_records.remove(&hash);
                    }
                }
                None => break,
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        if state.block_records.len() > 4 * self.constants.blocks_cache_size as usize {
            warn!(
                size = state.block_records.len(),
                "block record cache larger than expected after eviction"
            );
        }
    }
}

fn spend_tuples(block: &CandidateBlock) -> Vec<(Coin, bool, Option<Hint>)> {
    block
        .reward_coins
        .iter()
        .map(|c| (*c, true, None))
        .chain(block.tx_additions.iter().map(|(c, h)| (*c, false, *h)))
        .collect()
}

fn removal_tuples(
    block: &CandidateBlock,
    additions: &[(Coin, bool, Option<Hint>)],
    fork_info: &ForkInfo,
    coin_store: Option<&CoinStore>,
) -> Vec<(CoinId, BlockId)> {
    block
        .tx_removals
        .iter()
        .map(|id| {
            let puzzle_hash = additions
                .iter()
                .find(|(c, _, _)| c.coin_id() == *id)
                .map(|(c, _, _)| c.puzzle_hash)
                .or_else(|| fork_info.additions_since_fork.get(id).map(|a| a.coin.puzzle_hash))
                .or_else(|| coin_store.and_then(|s| s.get_coin_record(id)).map(|r| r.coin.puzzle_hash))
                .unwrap_or_else(BlockId::zero);
            (*id, puzzle_hash)
        })
        .collect()
}
