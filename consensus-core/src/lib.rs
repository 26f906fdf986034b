pub mod block_record;
pub mod blockchain;
pub mod body_validator;
pub mod coin_store;
pub mod fork_info;
pub mod height_map;
pub mod interfaces;
pub mod pre_validation;
pub mod priority_mutex;
pub mod wallet_blockchain;

pub use block_record::{AddBlockOutcome, BlockRecord, CandidateBlock, Coin, CoinRecord, StateChangeSummary};
pub use blockchain::Blockchain;
pub use body_validator::{validate_body, AlwaysValid, SignatureStatus, SignatureValidator};
pub use coin_store::{CoinStore, NewCoin};
pub use fork_info::{ForkAddition, ForkInfo, ForkRemoval};
pub use height_map::{HeightMap, SubEpochSummary};
pub use interfaces::{BlockStore, ChallengeSegments, WeightProof, WeightProofVerifier};
pub use pre_validation::{InlineExecutor, PreValidationError, PreValidationPool, PreValidationResult, ThreadPool, ValidationJob};
pub use priority_mutex::{Priority, PriorityMutex, PriorityMutexGuard};
pub use wallet_blockchain::WalletBlockchain;

pub use consensus_types::{
    Amount, BlockHeight, BlockId, CoinId, CoinRef, ConsensusConstants, ConsensusError, Hash256, Hint,
    ParseHashError, StorageError, Timestamp, TotalIters, Weight,
};
