//! Consensus parameters, owned and passed by shared reference at
//! construction time rather than read from globals or loaded from disk.

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;

/// Parameters that govern block validation and difficulty adjustment. An
/// implementer constructs one of these and hands the `Blockchain` engine a
/// shared reference to it; nothing in this crate reads consensus parameters
/// from a global, an environment variable, or a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConstants {
    pub slot_blocks_target: u32,
    pub min_blocks_per_challenge_block: u8,
    pub max_sub_slot_blocks: u32,
    pub num_sps_sub_slot: u32,
    pub sub_slot_iters_starting: u64,
    pub difficulty_constant_factor: u128,
    pub difficulty_starting: u64,
    pub difficulty_change_max_factor: u32,
    pub sub_epoch_blocks: u32,
    pub epoch_blocks: u32,
    pub significant_bits: u8,
    pub num_sp_intervals_extra: u32,
    pub max_future_time2: u64,
    pub number_of_timestamps: usize,

    /// The previous-hash every genesis block must reference.
    pub genesis_challenge: Hash256,
    /// Replay-protection data folded into `AGG_SIG_ME` signature digests.
    pub agg_sig_me_additional_data: Hash256,

    pub max_coin_amount: u64,
    pub max_block_cost_clvm: u64,
    pub cost_per_byte: u64,

    pub weight_proof_threshold: u8,
    pub blocks_cache_size: u32,
    pub weight_proof_recent_blocks: u32,
    pub max_block_count_per_requests: u32,
    pub max_generator_size: u32,
    pub max_generator_ref_list_size: u32,

    pub soft_fork2_height: u32,
    pub soft_fork3_height: u32,
    pub hard_fork_height: u32,
    pub plot_filter_128_height: u32,
    pub plot_filter_64_height: u32,
    pub plot_filter_32_height: u32,
}

impl ConsensusConstants {
    /// The production parameter set, grounded in the network's published
    /// default constants.
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            slot_blocks_target: 32,
            min_blocks_per_challenge_block: 16,
            max_sub_slot_blocks: 128,
            num_sps_sub_slot: 64,
            sub_slot_iters_starting: 1 << 27,
            difficulty_constant_factor: 1u128 << 67,
            difficulty_starting: 7,
            difficulty_change_max_factor: 3,
            sub_epoch_blocks: 384,
            epoch_blocks: 4608,
            significant_bits: 8,
            num_sp_intervals_extra: 3,
            max_future_time2: 2 * 60,
            number_of_timestamps: 11,
            genesis_challenge: Hash256::hash(b"mainnet-genesis-challenge"),
            agg_sig_me_additional_data: Hash256::hash(b"mainnet-agg-sig-me"),
            max_coin_amount: u64::MAX,
            max_block_cost_clvm: 11_000_000_000,
            cost_per_byte: 12_000,
            weight_proof_threshold: 2,
            blocks_cache_size: 4608 + (128 * 4),
            weight_proof_recent_blocks: 1000,
            max_block_count_per_requests: 32,
            max_generator_size: 1_000_000,
            max_generator_ref_list_size: 512,
            soft_fork2_height: 3_700_000,
            soft_fork3_height: 3_750_000,
            hard_fork_height: 4_996_000,
            plot_filter_128_height: 10_542_000,
            plot_filter_64_height: 15_592_000,
            plot_filter_32_height: 20_643_000,
        }
    }

    /// A scaled-down parameter set for tests: small cache sizes and epoch
    /// lengths so scenarios can exercise sub-epoch and cache-eviction
    /// behavior without constructing thousands of blocks.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            slot_blocks_target: 4,
            min_blocks_per_challenge_block: 1,
            max_sub_slot_blocks: 8,
            num_sps_sub_slot: 8,
            sub_slot_iters_starting: 1 << 10,
            difficulty_constant_factor: 1u128 << 20,
            difficulty_starting: 1,
            difficulty_change_max_factor: 3,
            sub_epoch_blocks: 8,
            epoch_blocks: 32,
            significant_bits: 8,
            num_sp_intervals_extra: 3,
            max_future_time2: 2 * 60,
            number_of_timestamps: 11,
            genesis_challenge: Hash256::hash(b"testing-genesis-challenge"),
            agg_sig_me_additional_data: Hash256::hash(b"testing-agg-sig-me"),
            max_coin_amount: u64::MAX,
            max_block_cost_clvm: 11_000_000_000,
            cost_per_byte: 12_000,
            weight_proof_threshold: 2,
            blocks_cache_size: 32,
            weight_proof_recent_blocks: 50,
            max_block_count_per_requests: 32,
            max_generator_size: 1_000_000,
            max_generator_ref_list_size: 512,
            soft_fork2_height: u32::MAX,
            soft_fork3_height: u32::MAX,
            hard_fork_height: u32::MAX,
            plot_filter_128_height: u32::MAX,
            plot_filter_64_height: u32::MAX,
            plot_filter_32_height: u32::MAX,
        }
    }
}
