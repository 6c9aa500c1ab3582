//! The chain service: serialized appends, full verification, provenance queries.

use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::hashing::{is_hex_digest, HashAlgorithm, DIGEST_HEX_LEN};
use crate::idea::IdeaId;
use crate::integrity::{
    verify_blocks, BlockPayload, ChainError, ChainStore, ChainVerification, IntegrityBlock,
    MemoryChainStore, GENESIS_PREVIOUS_HASH,
};
use crate::trace::now_epoch_ms;

/// Millisecond wall clock used to stamp blocks.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_epoch_ms()
    }
}

#[derive(Debug, Clone)]
struct ChainTip {
    /// Number of blocks, which is also the next block's index.
    len: u64,
    hash: String,
    timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub total_blocks: usize,
    pub unique_ideas: usize,
    pub first_timestamp_ms: Option<i64>,
    pub last_timestamp_ms: Option<i64>,
    pub valid: bool,
}

pub struct IntegrityChain {
    store: Box<dyn ChainStore>,
    algorithm: HashAlgorithm,
    clock: Arc<dyn Clock>,
    tip: RwLock<Option<ChainTip>>,
}

impl IntegrityChain {
    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Self {
            store: Box::new(MemoryChainStore::new()),
            algorithm,
            clock: Arc::new(SystemClock),
            tip: RwLock::new(None),
        }
    }

    /// Resume from whatever `store` already holds.
    pub fn open(store: Box<dyn ChainStore>, algorithm: HashAlgorithm) -> Result<Self, ChainError> {
        let blocks = store.load()?;
        let len = blocks.len() as u64;
        let tip = blocks.last().map(|b| ChainTip {
            len,
            hash: b.hash.clone(),
            timestamp_ms: b.timestamp_ms,
        });
        info!(blocks = blocks.len(), algorithm = %algorithm, "integrity chain opened");
        Ok(Self {
            store,
            algorithm,
            clock: Arc::new(SystemClock),
            tip: RwLock::new(tip),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn len(&self) -> Result<usize, ChainError> {
        let tip = self.tip.read().map_err(|_| ChainError::Poisoned)?;
        Ok(tip.as_ref().map(|t| t.len as usize).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, ChainError> {
        Ok(self.len()? == 0)
    }

    /// Append a block for `idea_id`. The store write happens before the tip
    /// moves, so a failed write leaves the chain untouched.
    pub fn append(&self, idea_id: &IdeaId, content_hash: &str) -> Result<IntegrityBlock, ChainError> {
        if content_hash.len() != DIGEST_HEX_LEN || !is_hex_digest(content_hash) {
            return Err(ChainError::InvalidContentHash {
                expected: DIGEST_HEX_LEN,
                actual: content_hash.to_string(),
            });
        }

        let mut tip = self.tip.write().map_err(|_| ChainError::Poisoned)?;
        let (index, previous_hash) = match tip.as_ref() {
            Some(t) => (t.len, t.hash.clone()),
            None => (0, GENESIS_PREVIOUS_HASH.to_string()),
        };
        let mut timestamp_ms = self.clock.now_ms();
        let len = index.checked_add(1).ok_or(ChainError::IndexOverflow)?;
        if let Some(t) = tip.as_ref() {
            if timestamp_ms < t.timestamp_ms {
                warn!(
                    clock_ms = timestamp_ms,
                    previous_ms = t.timestamp_ms,
                    "clock moved backwards; reusing previous block timestamp"
                );
                timestamp_ms = t.timestamp_ms;
            }
        }

        let block = IntegrityBlock::seal(
            index,
            timestamp_ms,
            BlockPayload {
                idea_id: idea_id.clone(),
                content_hash: content_hash.to_string(),
            },
            previous_hash,
            self.algorithm,
        );
        self.store.append(&block)?;
        *tip = Some(ChainTip {
            len,
            hash: block.hash.clone(),
            timestamp_ms,
        });
        Ok(block)
    }

    /// Consistent copy of every block.
    pub fn blocks(&self) -> Result<Vec<IntegrityBlock>, ChainError> {
        let _tip = self.tip.read().map_err(|_| ChainError::Poisoned)?;
        self.store.load()
    }

    pub fn verify(&self) -> Result<ChainVerification, ChainError> {
        let blocks = self.blocks()?;
        let verification = verify_blocks(&blocks, self.algorithm);
        if let Some(fault) = verification.fault {
            warn!(index = fault.index, kind = %fault.kind, "integrity chain verification failed");
        }
        Ok(verification)
    }

    /// Blocks recorded for `idea_id`, oldest first.
    pub fn provenance(&self, idea_id: &IdeaId) -> Result<Vec<IntegrityBlock>, ChainError> {
        let _tip = self.tip.read().map_err(|_| ChainError::Poisoned)?;
        self.store.load_for(idea_id)
    }

    /// Whether the latest block for `idea_id` records `content_hash`.
    pub fn verify_content(&self, idea_id: &IdeaId, content_hash: &str) -> Result<bool, ChainError> {
        Ok(self
            .provenance(idea_id)?
            .last()
            .is_some_and(|b| b.payload.content_hash == content_hash))
    }

    pub fn summary(&self) -> Result<ChainSummary, ChainError> {
        let blocks = self.blocks()?;
        let unique_ideas = blocks
            .iter()
            .map(|b| &b.payload.idea_id)
            .collect::<HashSet<_>>()
            .len();
        Ok(ChainSummary {
            total_blocks: blocks.len(),
            unique_ideas,
            first_timestamp_ms: blocks.first().map(|b| b.timestamp_ms),
            last_timestamp_ms: blocks.last().map(|b| b.timestamp_ms),
            valid: verify_blocks(&blocks, self.algorithm).valid,
        })
    }

    /// Write one JSON block per line; returns the number of blocks written.
    pub fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, ChainError> {
        let blocks = self.blocks()?;
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        for block in &blocks {
            let line = serde_json::to_string(block).map_err(|e| ChainError::Serde(e.to_string()))?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(blocks.len())
    }
}
