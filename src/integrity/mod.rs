//! Append-only, hash-linked log of accepted ideas.
//!
//! Each block commits to its position, timestamp, payload, and the previous
//! block's hash. Verification walks the whole sequence and reports the first
//! broken index; nothing is ever repaired in place.

pub mod block;
pub mod chain;
pub mod store;

pub use block::{
    verify_blocks, BlockPayload, ChainFault, ChainVerification, FaultKind, IntegrityBlock,
};
pub use chain::{ChainSummary, Clock, IntegrityChain, SystemClock};
pub use store::{ChainLock, ChainStore, MemoryChainStore, SqliteChainStore};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain integrity violated at block {index}: {kind}")]
    Integrity { index: u64, kind: FaultKind },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("chain lock poisoned")]
    Poisoned,
    #[error("content hash must be a {expected}-character hex digest (got {actual:?})")]
    InvalidContentHash { expected: usize, actual: String },
    #[error("block index space exhausted")]
    IndexOverflow,
}
