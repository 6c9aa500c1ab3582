#![forbid(unsafe_code)]

//! # idea-rank
//!
//! Ranks candidate ideas by folding independently computed signals into one
//! score, then reorders the best of them so the final list is both relevant
//! and varied. Every accepted idea is written to an append-only, hash-linked
//! log that can be re-verified end to end.
//!
//! Flow: [`RatingTracker`] supplies ratings, [`CompositeScorer`] and
//! [`EnhancementPipeline`] produce an adjusted score, [`DiversityReranker`]
//! picks the final order, and [`IntegrityChain`] records what was accepted.
//! [`RankingEngine`] wires the stages together.

pub mod config;
pub mod hashing;
pub mod idea;
pub mod integrity;
pub mod pipeline;
pub mod rating_tracker;
pub mod rerank;
pub mod scoring;
pub mod trace;

pub use config::{ConfigError, RankingConfig, SignalWeights};
pub use hashing::HashAlgorithm;
pub use idea::{Idea, IdeaId, ScoreVector, Signal};
pub use integrity::{
    ChainError, ChainStore, ChainVerification, IntegrityBlock, IntegrityChain, MemoryChainStore,
    SqliteChainStore,
};
pub use pipeline::{
    Candidate, PipelineError, RankedIdea, RankingEngine, RankingRequest, RankingResponse,
    StorageRecord,
};
pub use rating_tracker::{RatingError, RatingRecord, RatingTracker};
pub use rerank::{
    DiversityReranker, EvaluationMetrics, MmrPreset, RerankCandidate, RerankError, RerankedItem,
};
pub use scoring::{
    CompositeScore, CompositeScorer, Enhancement, EnhancementPipeline, ScoreError,
};
pub use trace::{
    JsonlTraceSink, MemoryTraceSink, RankingTrace, RunTrace, TraceError, TraceEvent, TraceSink,
    TraceSummary, TraceWorker,
};
