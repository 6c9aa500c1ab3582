//! Block layout, hashing, and sequence verification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hashing::HashAlgorithm;
use crate::idea::IdeaId;
use crate::integrity::{ChainError, GENESIS_PREVIOUS_HASH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub idea_id: IdeaId,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityBlock {
    pub index: u64,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    pub payload: BlockPayload,
    pub previous_hash: String,
    pub hash: String,
}

impl IntegrityBlock {
    /// Build a block and fill in its hash.
    pub fn seal(
        index: u64,
        timestamp_ms: i64,
        payload: BlockPayload,
        previous_hash: impl Into<String>,
        algorithm: HashAlgorithm,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp_ms,
            payload,
            previous_hash: previous_hash.into(),
            hash: String::new(),
        };
        block.hash = block.compute_hash(algorithm);
        block
    }

    /// `H(index | timestamp | idea_id | content_hash | previous_hash)`.
    pub fn compute_hash(&self, algorithm: HashAlgorithm) -> String {
        let index = self.index.to_string();
        let timestamp = self.timestamp_ms.to_string();
        algorithm.hash_fields(&[
            &index,
            &timestamp,
            self.payload.idea_id.as_str(),
            &self.payload.content_hash,
            &self.previous_hash,
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Stored index differs from the block's position.
    IndexMismatch,
    /// Recomputed hash differs from the stored one.
    HashMismatch,
    /// `previous_hash` does not match the prior block (or genesis).
    LinkMismatch,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::IndexMismatch => "index mismatch",
            Self::HashMismatch => "hash mismatch",
            Self::LinkMismatch => "link mismatch",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFault {
    pub index: u64,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub first_bad_index: Option<u64>,
    pub fault: Option<ChainFault>,
    pub blocks_checked: usize,
}

impl ChainVerification {
    pub fn as_tuple(&self) -> (bool, Option<u64>) {
        (self.valid, self.first_bad_index)
    }

    /// Number of verified blocks, or the first fault as an error.
    pub fn into_result(self) -> Result<usize, ChainError> {
        match self.fault {
            Some(ChainFault { index, kind }) => Err(ChainError::Integrity { index, kind }),
            None => Ok(self.blocks_checked),
        }
    }
}

/// Walk `blocks` in order and stop at the first broken position.
pub fn verify_blocks(blocks: &[IntegrityBlock], algorithm: HashAlgorithm) -> ChainVerification {
    let mut expected_previous = GENESIS_PREVIOUS_HASH;
    for (position, block) in blocks.iter().enumerate() {
        let position = position as u64;
        let kind = if block.index != position {
            Some(FaultKind::IndexMismatch)
        } else if block.compute_hash(algorithm) != block.hash {
            Some(FaultKind::HashMismatch)
        } else if block.previous_hash != expected_previous {
            Some(FaultKind::LinkMismatch)
        } else {
            None
        };
        if let Some(kind) = kind {
            return ChainVerification {
                valid: false,
                first_bad_index: Some(position),
                fault: Some(ChainFault {
                    index: position,
                    kind,
                }),
                blocks_checked: position as usize,
            };
        }
        expected_previous = block.hash.as_str();
    }
    ChainVerification {
        valid: true,
        first_bad_index: None,
        fault: None,
        blocks_checked: blocks.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(n: u64, algorithm: HashAlgorithm) -> Vec<IntegrityBlock> {
        let mut blocks: Vec<IntegrityBlock> = Vec::new();
        for i in 0..n {
            let previous = blocks
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
            let payload = BlockPayload {
                idea_id: IdeaId::new(format!("idea-{i}")),
                content_hash: algorithm.hash_text(&format!("content-{i}")),
            };
            blocks.push(IntegrityBlock::seal(i, 1_000 + i as i64, payload, previous, algorithm));
        }
        blocks
    }

    #[test]
    fn empty_and_intact_chains_verify() {
        assert_eq!(verify_blocks(&[], HashAlgorithm::Blake3).as_tuple(), (true, None));
        for alg in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            let v = verify_blocks(&build(4, alg), alg);
            assert_eq!(v.as_tuple(), (true, None));
            assert_eq!(v.into_result().unwrap(), 4);
        }
    }

    #[test]
    fn wrong_algorithm_fails_at_genesis() {
        let blocks = build(2, HashAlgorithm::Blake3);
        let v = verify_blocks(&blocks, HashAlgorithm::Sha256);
        assert_eq!(v.as_tuple(), (false, Some(0)));
        assert_eq!(v.fault.unwrap().kind, FaultKind::HashMismatch);
    }

    #[test]
    fn resealed_block_breaks_the_next_link() {
        let alg = HashAlgorithm::Blake3;
        let mut blocks = build(3, alg);
        blocks[1].payload.content_hash = alg.hash_text("forged");
        blocks[1].hash = blocks[1].compute_hash(alg);
        let v = verify_blocks(&blocks, alg);
        assert_eq!(v.as_tuple(), (false, Some(2)));
        assert!(matches!(
            v.into_result(),
            Err(ChainError::Integrity {
                index: 2,
                kind: FaultKind::LinkMismatch
            })
        ));
    }
}
