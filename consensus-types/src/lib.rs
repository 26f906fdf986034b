pub mod constants;
pub mod error;
pub mod hash;
pub mod ids;

pub use constants::ConsensusConstants;
pub use error::{ConsensusError, ParseHashError, StorageError};
pub use hash::Hash256;
pub use ids::{Amount, BlockHeight, BlockId, CoinId, CoinRef, Hint, Timestamp, TotalIters, Weight};
