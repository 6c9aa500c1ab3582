//! Ratings → composite score → enhancement → diversity rerank → integrity log.
//!
//! A ranking run is pure with respect to the chain: nothing is recorded until
//! the caller accepts a result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, RankingConfig};
use crate::idea::{Idea, IdeaId, ScoreVector, Signal};
use crate::integrity::{ChainError, IntegrityChain};
use crate::rating_tracker::{RatingError, RatingParams, RatingTracker};
use crate::rerank::{
    check_embedding, DiversityReranker, RerankCandidate, RerankError, RerankedItem,
};
use crate::scoring::{CompositeScore, CompositeScorer, Enhancement, EnhancementPipeline, ScoreError};
use crate::trace::{now_epoch_ms, RankingTrace, RunTrace, TraceEvent, TraceSink};

// =============================================================================
// Types
// =============================================================================

/// An idea plus the features computed for it upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub idea: Idea,
    /// Sentiment, trend, provenance, serendipity, causal impact, ethics and
    /// feasibility. Rating signals in here are replaced by tracker values.
    #[serde(default)]
    pub features: ScoreVector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRequest {
    pub candidates: Vec<Candidate>,
    /// Number of results after diversification.
    pub k: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedIdea {
    pub idea_id: IdeaId,
    /// 1-based final position.
    pub rank: usize,
    /// 1-based position by adjusted score before diversification.
    pub relevance_rank: usize,
    pub base_score: f64,
    pub adjusted_score: f64,
    pub mmr_score: f64,
    pub enhancement: Enhancement,
    pub composite: CompositeScore,
    /// Signal vector after this pass (ratings and freshness refreshed).
    pub scores: ScoreVector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingMeta {
    pub candidates: usize,
    pub pool: usize,
    pub selected: usize,
    pub mmr_lambda: f64,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingResponse {
    pub run_id: Uuid,
    pub results: Vec<RankedIdea>,
    pub meta: RankingMeta,
}

/// What the relational store persists for an accepted idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub idea_id: IdeaId,
    pub content_hash: String,
    pub adjusted_score: f64,
    pub rank: usize,
    pub block_index: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("scoring failed for {idea_id}: {source}")]
    Score {
        idea_id: IdeaId,
        #[source]
        source: ScoreError,
    },
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    Rerank(#[from] RerankError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("ranked result {ranked} does not belong to idea {idea}")]
    IdeaMismatch { idea: IdeaId, ranked: IdeaId },
    #[error("no idea supplied for ranked result {0}")]
    MissingIdea(IdeaId),
}

struct Scored {
    idea: Idea,
    scores: ScoreVector,
    composite: CompositeScore,
    enhancement: Enhancement,
}

// =============================================================================
// Engine
// =============================================================================

pub struct RankingEngine {
    config: RankingConfig,
    scorer: CompositeScorer,
    enhancer: EnhancementPipeline,
    reranker: DiversityReranker,
    ratings: Arc<RatingTracker>,
    chain: Arc<IntegrityChain>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl RankingEngine {
    pub fn new(config: RankingConfig, chain: Arc<IntegrityChain>) -> Result<Self, PipelineError> {
        config.validate()?;
        if chain.algorithm() != config.hash_algorithm {
            return Err(ConfigError::Invalid(format!(
                "chain uses {} but hash_algorithm is {}",
                chain.algorithm(),
                config.hash_algorithm
            ))
            .into());
        }
        Ok(Self {
            scorer: CompositeScorer::new(&config)?,
            enhancer: EnhancementPipeline::new(&config)?,
            reranker: DiversityReranker::new(config.mmr_lambda)?.with_dimension(config.embedding_dim),
            ratings: Arc::new(RatingTracker::new(&config)?),
            chain,
            trace: None,
            config,
        })
    }

    /// Engine over a fresh in-memory chain.
    pub fn in_memory(config: RankingConfig) -> Result<Self, PipelineError> {
        let chain = Arc::new(IntegrityChain::in_memory(config.hash_algorithm));
        Self::new(config, chain)
    }

    /// Share an existing tracker (e.g. one warm-started from storage).
    ///
    /// The tracker must have been built from the same Elo and Bayesian
    /// settings as this engine; scoring normalizes against them.
    pub fn with_ratings(mut self, ratings: Arc<RatingTracker>) -> Result<Self, PipelineError> {
        let expected = RatingParams::from(&self.config);
        if *ratings.params() != expected {
            return Err(ConfigError::Invalid(format!(
                "rating tracker uses {:?}, engine expects {:?}",
                ratings.params(),
                expected
            ))
            .into());
        }
        self.ratings = ratings;
        Ok(self)
    }

    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn ratings(&self) -> &Arc<RatingTracker> {
        &self.ratings
    }

    pub fn chain(&self) -> &Arc<IntegrityChain> {
        &self.chain
    }

    pub fn rank(&self, request: RankingRequest) -> Result<RankingResponse, PipelineError> {
        let run_id = Uuid::new_v4();
        let total = request.candidates.len();

        let mut seen = HashSet::with_capacity(total);
        for candidate in &request.candidates {
            let idea = &candidate.idea;
            check_embedding(&idea.id, &idea.embedding, self.config.embedding_dim)?;
            if !seen.insert(idea.id.clone()) {
                return Err(RerankError::DuplicateCandidate(idea.id.clone()).into());
            }
        }

        let mut scored = Vec::with_capacity(total);
        for candidate in request.candidates {
            scored.push(self.score_candidate(candidate, request.as_of)?);
        }
        scored.sort_by(|a, b| {
            b.enhancement
                .adjusted_score
                .total_cmp(&a.enhancement.adjusted_score)
                .then_with(|| a.idea.id.cmp(&b.idea.id))
        });

        let pool = scored.len().min(self.config.candidate_pool);
        let rerank_input: Vec<RerankCandidate> = scored[..pool]
            .iter()
            .map(|s| RerankCandidate {
                id: s.idea.id.clone(),
                relevance: s.enhancement.adjusted_score,
                embedding: s.idea.embedding.clone(),
            })
            .collect();
        let selected = self.reranker.rerank(&rerank_input, request.k)?;

        let results = assemble_results(&selected, &scored)?;

        let meta = RankingMeta {
            candidates: total,
            pool,
            selected: results.len(),
            mmr_lambda: self.reranker.lambda(),
            as_of: request.as_of,
        };
        self.emit_traces(&meta, run_id, request.k, &scored, &results);
        tracing::info!(
            run_id = %run_id,
            candidates = total,
            pool,
            selected = results.len(),
            "ranking run complete"
        );

        Ok(RankingResponse {
            run_id,
            results,
            meta,
        })
    }

    /// Record `idea` in the integrity chain and produce its storage record.
    pub fn accept(&self, idea: &Idea, ranked: &RankedIdea) -> Result<StorageRecord, PipelineError> {
        if idea.id != ranked.idea_id {
            return Err(PipelineError::IdeaMismatch {
                idea: idea.id.clone(),
                ranked: ranked.idea_id.clone(),
            });
        }
        let content_hash = idea.content_hash(self.chain.algorithm());
        let block = self.chain.append(&idea.id, &content_hash)?;
        Ok(StorageRecord {
            idea_id: idea.id.clone(),
            content_hash,
            adjusted_score: ranked.adjusted_score,
            rank: ranked.rank,
            block_index: block.index,
        })
    }

    /// Accept every result of `response` in rank order.
    pub fn accept_all(
        &self,
        ideas: &[Idea],
        response: &RankingResponse,
    ) -> Result<Vec<StorageRecord>, PipelineError> {
        let by_id: HashMap<&IdeaId, &Idea> = ideas.iter().map(|i| (&i.id, i)).collect();
        response
            .results
            .iter()
            .map(|ranked| {
                let idea = by_id
                    .get(&ranked.idea_id)
                    .ok_or_else(|| PipelineError::MissingIdea(ranked.idea_id.clone()))?;
                self.accept(idea, ranked)
            })
            .collect()
    }

    fn score_candidate(
        &self,
        candidate: Candidate,
        as_of: DateTime<Utc>,
    ) -> Result<Scored, PipelineError> {
        let Candidate { idea, features } = candidate;
        let rating = self.ratings.get(&idea.id)?;

        let mut scores = idea.scores.clone();
        scores.merge(&features);
        scores.set(Signal::Elo, rating.elo);
        scores.set(Signal::BayesianMean, rating.bayesian_mean);
        scores.set(Signal::BayesianStd, rating.bayesian_std);

        let score_err = |source: ScoreError| PipelineError::Score {
            idea_id: idea.id.clone(),
            source,
        };
        let composite = self
            .scorer
            .score(&idea, &scores, as_of)
            .map_err(score_err)?;
        scores.set(Signal::Freshness, composite.freshness);

        let ethics = scores.require(Signal::EthicsScore).map_err(score_err)?;
        let feasibility = scores.require(Signal::FeasibilityScore).map_err(score_err)?;
        let causal = scores.require(Signal::CausalImpact).map_err(score_err)?;
        let enhancement = self
            .enhancer
            .enhance(composite.base_score, ethics, feasibility, causal)
            .map_err(score_err)?;

        Ok(Scored {
            idea,
            scores,
            composite,
            enhancement,
        })
    }

    fn emit_traces(
        &self,
        meta: &RankingMeta,
        run_id: Uuid,
        k: usize,
        scored: &[Scored],
        results: &[RankedIdea],
    ) {
        let Some(sink) = self.trace.as_ref() else {
            return;
        };
        let finals: HashMap<&IdeaId, &RankedIdea> =
            results.iter().map(|r| (&r.idea_id, r)).collect();
        let run_id = run_id.to_string();
        let header = TraceEvent::Run(RunTrace {
            run_id: run_id.clone(),
            timestamp_ms: now_epoch_ms(),
            as_of: meta.as_of,
            mmr_lambda: meta.mmr_lambda,
            k,
            candidates: meta.candidates,
            pool: meta.pool,
        });
        let rows = scored.iter().enumerate().map(|(idx, entry)| {
            let ranked = finals.get(&entry.idea.id);
            TraceEvent::Candidate(RankingTrace {
                run_id: run_id.clone(),
                idea_id: entry.idea.id.clone(),
                base_score: entry.composite.base_score,
                adjusted_score: entry.enhancement.adjusted_score,
                ethics_multiplier: entry.enhancement.ethics_multiplier,
                feasibility_multiplier: entry.enhancement.feasibility_multiplier,
                causal_boost: entry.enhancement.causal_boost,
                relevance_rank: idx + 1,
                final_rank: ranked.map(|r| r.rank),
                mmr_score: ranked.map(|r| r.mmr_score),
            })
        });
        for event in std::iter::once(header).chain(rows) {
            if let Err(err) = sink.record(event) {
                tracing::warn!(run_id = %run_id, error = %err, "trace sink rejected event; dropping the rest");
                break;
            }
        }
    }
}

/// Join the reranker's picks back to their scoring detail, in pick order.
fn assemble_results(
    selected: &[RerankedItem],
    scored: &[Scored],
) -> Result<Vec<RankedIdea>, PipelineError> {
    let by_id: HashMap<&IdeaId, &Scored> = scored.iter().map(|s| (&s.idea.id, s)).collect();
    selected
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let entry = by_id
                .get(&item.id)
                .ok_or_else(|| PipelineError::MissingIdea(item.id.clone()))?;
            Ok(RankedIdea {
                idea_id: item.id.clone(),
                rank: position + 1,
                relevance_rank: item.relevance_rank,
                base_score: entry.composite.base_score,
                adjusted_score: entry.enhancement.adjusted_score,
                mmr_score: item.mmr_score,
                enhancement: entry.enhancement,
                composite: entry.composite.clone(),
                scores: entry.scores.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(title: &str) -> Candidate {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().unwrap();
        Candidate {
            idea: Idea::new(title, "body", "ana", as_of, vec![1.0, 0.0]),
            features: ScoreVector::new()
                .with(Signal::Sentiment, 0.2)
                .with(Signal::Trend, 0.5)
                .with(Signal::CausalImpact, 0.3)
                .with(Signal::Provenance, 0.7)
                .with(Signal::Serendipity, 0.4)
                .with(Signal::EthicsScore, 0.9)
                .with(Signal::FeasibilityScore, 0.5),
        }
    }

    #[test]
    fn unknown_pick_is_an_error_not_a_gap() {
        let config = RankingConfig {
            embedding_dim: 2,
            ..RankingConfig::default()
        };
        let engine = RankingEngine::in_memory(config).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).single().unwrap();
        let scored = vec![engine.score_candidate(candidate("known"), as_of).unwrap()];
        let known = scored[0].idea.id.clone();

        let pick = |id: IdeaId| RerankedItem {
            id,
            relevance_rank: 1,
            relevance: 0.5,
            mmr_score: 0.25,
            max_similarity: 0.0,
        };
        let ok = assemble_results(&[pick(known.clone())], &scored).unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].rank, 1);
        assert_eq!(ok[0].idea_id, known);

        let stray = IdeaId::from("stray");
        match assemble_results(&[pick(known), pick(stray.clone())], &scored) {
            Err(PipelineError::MissingIdea(id)) => assert_eq!(id, stray),
            other => panic!("expected missing idea, got {other:?}"),
        }
    }
}
