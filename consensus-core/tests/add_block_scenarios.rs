//! End-to-end scenarios against the public `Blockchain` API: genesis
//! admission, a linear run of transaction blocks, a reorg, a cross-fork
//! double spend, an equal-weight orphan, and a disconnected block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use consensus_core::{
    AddBlockOutcome, AlwaysValid, BlockHeight, BlockId, BlockRecord, BlockStore, Blockchain,
    CandidateBlock, Coin, ConsensusConstants, Hash256, InlineExecutor, PreValidationResult, StorageError,
};

#[derive(Default)]
struct FakeBlockStore {
    records: StdMutex<HashMap<BlockId, BlockRecord>>,
    blocks: StdMutex<HashMap<BlockId, CandidateBlock>>,
}

#[async_trait]
impl BlockStore for FakeBlockStore {
    async fn add_full_block(
        &self,
        hash: BlockId,
        block: &CandidateBlock,
        record: &BlockRecord,
    ) -> Result<(), StorageError> {
        self.records.lock().unwrap().insert(hash, record.clone());
        self.blocks.lock().unwrap().insert(hash, block.clone());
        Ok(())
    }
    async fn set_in_chain(&self, _hashes: &[BlockId]) -> Result<(), StorageError> {
        Ok(())
    }
    async fn set_peak(&self, _hash: BlockId) -> Result<(), StorageError> {
        Ok(())
    }
    async fn rollback(&self, _height: BlockHeight) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_full_block(&self, hash: BlockId) -> Result<Option<CandidateBlock>, StorageError> {
        Ok(self.blocks.lock().unwrap().get(&hash).cloned())
    }
    async fn get_blocks_by_hash(&self, hashes: &[BlockId]) -> Result<Vec<CandidateBlock>, StorageError> {
        let blocks = self.blocks.lock().unwrap();
        Ok(hashes.iter().filter_map(|h| blocks.get(h).cloned()).collect())
    }
    async fn get_generators_at(&self, _heights: &[BlockHeight]) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(Vec::new())
    }
    async fn get_generator(&self, _hash: BlockId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }
    async fn get_block_record(&self, hash: BlockId) -> Result<Option<BlockRecord>, StorageError> {
        Ok(self.records.lock().unwrap().get(&hash).cloned())
    }
    async fn get_block_records_close_to_peak(
        &self,
        _n: usize,
    ) -> Result<(Vec<BlockRecord>, Option<BlockId>), StorageError> {
        Ok((Vec::new(), None))
    }
    async fn get_block_records_by_hash(&self, hashes: &[BlockId]) -> Result<Vec<BlockRecord>, StorageError> {
        let records = self.records.lock().unwrap();
        Ok(hashes.iter().filter_map(|h| records.get(h).cloned()).collect())
    }
    async fn get_block_records_in_range(
        &self,
        _lo: BlockHeight,
        _hi: BlockHeight,
    ) -> Result<Vec<BlockRecord>, StorageError> {
        Ok(Vec::new())
    }
    async fn get_prev_hash(&self, hash: BlockId) -> Result<Option<BlockId>, StorageError> {
        Ok(self.records.lock().unwrap().get(&hash).map(|r| r.prev_hash))
    }
    async fn persist_sub_epoch_challenge_segments(
        &self,
        _hash: BlockId,
        _segments: &consensus_core::ChallengeSegments,
    ) -> Result<(), StorageError> {
        Ok(())
    }
    async fn get_sub_epoch_challenge_segments(
        &self,
        _hash: BlockId,
    ) -> Result<Option<consensus_core::ChallengeSegments>, StorageError> {
        Ok(None)
    }
    async fn is_fully_compactified(&self, _hash: BlockId) -> Result<Option<bool>, StorageError> {
        Ok(None)
    }
    async fn rollback_cache_block(&self, _hash: BlockId) -> Result<(), StorageError> {
        Ok(())
    }
}

fn new_chain(constants: &ConsensusConstants) -> Blockchain {
    Blockchain::new(
        constants.clone(),
        Arc::new(FakeBlockStore::default()),
        Arc::new(InlineExecutor::new()),
    )
}

fn ok_pre_validation() -> PreValidationResult {
    PreValidationResult {
        error: None,
        required_iters: Some(1),
        validated_signature: true,
    }
}

fn genesis(constants: &ConsensusConstants) -> CandidateBlock {
    CandidateBlock {
        header_hash: Hash256::hash(b"genesis"),
        prev_hash: constants.genesis_challenge,
        height: 0,
        weight: 10,
        total_iters: 0,
        sub_slot_iters: 1,
        required_iters: 1,
        deficit: 0,
        overflow: false,
        first_in_sub_slot: true,
        is_transaction_block: false,
        timestamp: None,
        reward_coins: vec![],
        tx_additions: vec![],
        tx_removals: vec![],
        cost: 0,
        challenge_chain_hash: Hash256::zero(),
        signage_point_hash: Hash256::zero(),
    }
}

/// Builds a tx block extending `parent`, optionally creating one fresh coin
/// and/or removing coins already on the chain.
#[allow(clippy::too_many_arguments)]
fn tx_block(
    parent: &CandidateBlock,
    label: &str,
    weight_delta: u128,
    tx_additions: Vec<(Coin, Option<consensus_core::Hint>)>,
    tx_removals: Vec<consensus_core::CoinId>,
) -> CandidateBlock {
    CandidateBlock {
        header_hash: Hash256::hash(label.as_bytes()),
        prev_hash: parent.header_hash,
        height: parent.height + 1,
        weight: parent.weight + weight_delta,
        total_iters: parent.total_iters + 100,
        sub_slot_iters: 1,
        required_iters: 1,
        deficit: 0,
        overflow: false,
        first_in_sub_slot: false,
        is_transaction_block: true,
        timestamp: Some(1_700_000_000 + parent.height as u64 + 1),
        reward_coins: vec![
            Coin::new(Hash256::zero(), Hash256::hash(format!("{label}-pool").as_bytes()), 1),
            Coin::new(Hash256::zero(), Hash256::hash(format!("{label}-farmer").as_bytes()), 1),
        ],
        tx_additions,
        tx_removals,
        cost: 0,
        challenge_chain_hash: Hash256::zero(),
        signage_point_hash: Hash256::zero(),
    }
}

#[tokio::test]
async fn s1_genesis_admit() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);
    let g = genesis(&constants);

    let outcome = chain.add_block(g.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    assert!(matches!(outcome, AddBlockOutcome::NewPeak(_)));
    assert_eq!(chain.get_peak_height().await, Some(0));
    assert_eq!(chain.height_to_hash(0).await, Some(g.header_hash));
    assert_eq!(chain.num_unspent().await, 0);
}

#[tokio::test]
async fn s2_linear_extension_creates_one_coin_per_block() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);

    let mut prev = genesis(&constants);
    chain.add_block(prev.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    for i in 1..=10u32 {
        let coin = Coin::new(Hash256::hash(&i.to_be_bytes()), Hash256::hash(format!("ph-{i}").as_bytes()), 1);
        let next = tx_block(&prev, &format!("block-{i}"), 10, vec![(coin, None)], vec![]);
        let outcome = chain.add_block(next.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();
        assert!(matches!(outcome, AddBlockOutcome::NewPeak(_)));

        let added = chain.get_coins_added_at_height(i).await;
        assert_eq!(added.len(), 3, "height {i} should have 2 reward coins + 1 tx coin");
        assert_eq!(chain.num_unspent().await as u32, 3 * i);

        prev = next;
    }
}

#[tokio::test]
async fn s3_three_block_reorg_rolls_back_and_replays() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);

    let g = genesis(&constants);
    chain.add_block(g.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    let mut a1 = tx_block(&g, "a1", 10, vec![], vec![]);
    a1.weight = 10;
    chain.add_block(a1.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();
    let mut a2 = tx_block(&a1, "a2", 10, vec![], vec![]);
    a2.weight = 20;
    chain.add_block(a2.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();
    let mut a3 = tx_block(&a2, "a3", 10, vec![], vec![]);
    a3.weight = 30;
    chain.add_block(a3.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();
    assert_eq!(chain.get_peak_height().await, Some(3));

    let mut b2 = tx_block(&a1, "b2", 15, vec![], vec![]);
    b2.weight = 25;
    let outcome = chain.add_block(b2.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();
    assert!(matches!(outcome, AddBlockOutcome::Orphan)); // still lighter than a3

    let mut b3 = tx_block(&b2, "b3", 10, vec![], vec![]);
    b3.weight = 35; // heavier than a3
    let outcome = chain.add_block(b3.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    match outcome {
        AddBlockOutcome::NewPeak(summary) => {
            assert_eq!(summary.fork_height, 1);
        }
        other => panic!("expected NewPeak, got {other:?}"),
    }
    assert_eq!(chain.get_peak_height().await, Some(3));
    assert_eq!(chain.height_to_hash(2).await, Some(b2.header_hash));
    assert_eq!(chain.height_to_hash(3).await, Some(b3.header_hash));
}

#[tokio::test]
async fn s4_double_spend_across_the_fork_boundary_is_rejected() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);

    let g = genesis(&constants);
    chain.add_block(g.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    let shared_coin = Coin::new(Hash256::hash(b"shared-parent"), Hash256::hash(b"shared-ph"), 7);
    let a1 = tx_block(&g, "shared-ancestor", 10, vec![(shared_coin, None)], vec![]);
    chain.add_block(a1.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    // Main chain spends the shared coin.
    let a2 = tx_block(&a1, "main-spends", 10, vec![], vec![shared_coin.coin_id()]);
    chain.add_block(a2.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    // A fork rooted at a1 tries to spend the same coin again.
    let fork_spend = tx_block(&a1, "fork-spends", 5, vec![], vec![shared_coin.coin_id()]);
    let outcome = chain
        .add_block(fork_spend, ok_pre_validation(), None, &AlwaysValid)
        .await
        .unwrap();

    match outcome {
        AddBlockOutcome::Invalid(err) => {
            use consensus_core::ConsensusError;
            assert!(matches!(
                err,
                ConsensusError::DoubleSpend(_) | ConsensusError::UnknownUnspentCoin(_)
            ));
        }
        other => panic!("expected Invalid(DoubleSpend | UnknownUnspentCoin), got {other:?}"),
    }
    assert_eq!(chain.get_peak_height().await, Some(2));
}

#[tokio::test]
async fn s5_orphan_on_equal_weight() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);

    let g = genesis(&constants);
    chain.add_block(g.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    let a = tx_block(&g, "a", 10, vec![], vec![]);
    chain.add_block(a.clone(), ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    let mut b = tx_block(&g, "b", 10, vec![], vec![]);
    b.weight = a.weight;
    let outcome = chain.add_block(b, ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    assert!(matches!(outcome, AddBlockOutcome::Orphan));
    assert_eq!(chain.get_peak_height().await, Some(1));
    assert_eq!(chain.height_to_hash(1).await, Some(a.header_hash));
}

#[tokio::test]
async fn s6_disconnected_block_is_rejected() {
    let constants = ConsensusConstants::testing();
    let chain = new_chain(&constants);

    let unknown_parent = genesis(&constants);
    let dangling = tx_block(&unknown_parent, "dangling", 10, vec![], vec![]);
    let outcome = chain.add_block(dangling, ok_pre_validation(), None, &AlwaysValid).await.unwrap();

    assert!(matches!(outcome, AddBlockOutcome::Disconnected));
    assert_eq!(chain.get_peak_height().await, None);
}
