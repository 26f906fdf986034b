//! Sequential coin-level rule checks run inside the add-block critical
//! section, after pre-validation has already confirmed the header, proof of
//! space, and (optionally) the aggregate signature.

use consensus_types::{BlockHeight, ConsensusConstants, ConsensusError, Timestamp};

use crate::block_record::{BlockRecord, CandidateBlock};
use crate::coin_store::CoinStore;
use crate::fork_info::ForkInfo;

/// Whether pre-validation already confirmed the block's aggregate
/// signature; if so, body validation does not re-verify it.
#[derive(Debug, Clone, Copy)]
pub struct SignatureStatus {
    pub already_validated: bool,
}

/// Injected by the caller: verifies a block's aggregate signature against
/// its announced conditions. Signature verification primitives are out of
/// scope for this crate; this is the narrow interface the engine calls
/// through.
pub trait SignatureValidator {
    fn validate(&self, block: &CandidateBlock) -> bool;
}

/// Runs the rules enumerated for body validation against `block`, given the
/// coin store's state as of `peak` and whatever this fork has accumulated
/// since its fork point.
///
/// Returns `Ok(())` if every rule passes. This function does not mutate
/// `coin_store` or `fork_info`; it is a read-only precondition check. The
/// caller applies the block's effects afterward via `CoinStore::new_block`
/// and `ForkInfo::include_spends`.
pub fn validate_body(
    constants: &ConsensusConstants,
    coin_store: &CoinStore,
    fork_info: Option<&ForkInfo>,
    peak: Option<&BlockRecord>,
    block: &CandidateBlock,
    signature_status: SignatureStatus,
    signature_validator: &dyn SignatureValidator,
) -> Result<(), ConsensusError> {
    validate_reward_coins(block)?;
    validate_cost(constants, block)?;
    validate_removals(coin_store, fork_info, block)?;
    validate_timestamp(constants, peak, block)?;
    if !signature_status.already_validated && !signature_validator.validate(block) {
        return Err(ConsensusError::InvalidSignature);
    }
    Ok(())
}

fn validate_reward_coins(block: &CandidateBlock) -> Result<(), ConsensusError> {
    if block.height == 0 {
        if !block.reward_coins.is_empty() {
            return Err(ConsensusError::RewardMismatch);
        }
    } else if block.is_transaction_block && block.reward_coins.len() < 2 {
        return Err(ConsensusError::RewardMismatch);
    }
    Ok(())
}

fn validate_cost(constants: &ConsensusConstants, block: &CandidateBlock) -> Result<(), ConsensusError> {
    if block.cost > constants.max_block_cost_clvm {
        return Err(ConsensusError::CostExceedsMax {
            cost: block.cost,
            max: constants.max_block_cost_clvm,
        });
    }
    Ok(())
}

/// For every removal: the coin must exist and be unspent at `height - 1` on
/// this fork, i.e. in the main-chain unspent set minus anything removed on
/// this fork up to `height - 1`, plus anything added on this fork up to
/// `height - 1`.
fn validate_removals(
    coin_store: &CoinStore,
    fork_info: Option<&ForkInfo>,
    block: &CandidateBlock,
) -> Result<(), ConsensusError> {
    for coin_id in &block.tx_removals {
        let spent_on_fork = fork_info.is_some_and(|f| f.contains_removal(coin_id));
        if spent_on_fork {
            return Err(ConsensusError::DoubleSpend(*coin_id));
        }

        let known_on_fork = fork_info.is_some_and(|f| f.contains_addition(coin_id));
        let known_on_main_chain = coin_store
            .get_coin_record(coin_id)
            .is_some_and(|r| !r.is_spent());

        if !known_on_fork && !known_on_main_chain {
            return Err(ConsensusError::UnknownUnspentCoin(*coin_id));
        }
    }
    Ok(())
}

fn validate_timestamp(
    constants: &ConsensusConstants,
    peak: Option<&BlockRecord>,
    block: &CandidateBlock,
) -> Result<(), ConsensusError> {
    let Some(timestamp) = block.timestamp else {
        return Ok(());
    };
    if let Some(peak) = peak {
        if let Some(peak_timestamp) = peak.timestamp {
            if timestamp <= peak_timestamp {
                return Err(ConsensusError::InvalidTimestamp);
            }
        }
    }
    let now = current_unix_time();
    if timestamp > now + constants.max_future_time2 {
        return Err(ConsensusError::InvalidTimestamp);
    }
    Ok(())
}

fn current_unix_time() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A `SignatureValidator` that always succeeds, for tests that are not
/// exercising signature rejection.
pub struct AlwaysValid;

impl SignatureValidator for AlwaysValid {
    fn validate(&self, _block: &CandidateBlock) -> bool {
        true
    }
}
