//! Greedy MMR selection.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::idea::IdeaId;
use crate::rerank::RerankError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankCandidate {
    pub id: IdeaId,
    pub relevance: f64,
    pub embedding: Vec<f32>,
}

impl RerankCandidate {
    pub fn new(id: impl Into<IdeaId>, relevance: f64, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            relevance,
            embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedItem {
    pub id: IdeaId,
    /// 1-based position in the relevance ordering before diversification.
    pub relevance_rank: usize,
    pub relevance: f64,
    /// Marginal score at the step this item was picked.
    pub mmr_score: f64,
    /// Highest similarity to any item picked before it (0 for the first).
    pub max_similarity: f64,
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Reject embeddings of the wrong length or with NaN/inf components.
pub fn check_embedding(
    id: &IdeaId,
    embedding: &[f32],
    expected: usize,
) -> Result<(), RerankError> {
    if embedding.len() != expected {
        return Err(RerankError::DimensionMismatch {
            id: id.clone(),
            expected,
            actual: embedding.len(),
        });
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(RerankError::NonFiniteEmbedding { id: id.clone() });
    }
    Ok(())
}

/// Named relevance/diversity trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MmrPreset {
    Relevance,
    #[default]
    Balanced,
    Diversity,
}

impl MmrPreset {
    pub fn lambda(self) -> f64 {
        match self {
            Self::Relevance => 0.8,
            Self::Balanced => 0.5,
            Self::Diversity => 0.2,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relevance" => Some(Self::Relevance),
            "balanced" => Some(Self::Balanced),
            "diversity" => Some(Self::Diversity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversityReranker {
    lambda: f64,
    dimension: Option<usize>,
}

struct Pending<'a> {
    candidate: &'a RerankCandidate,
    rank: usize,
    max_similarity: Option<f64>,
}

impl DiversityReranker {
    pub fn new(lambda: f64) -> Result<Self, RerankError> {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(RerankError::InvalidLambda(lambda));
        }
        Ok(Self {
            lambda,
            dimension: None,
        })
    }

    pub fn from_preset(preset: MmrPreset) -> Self {
        Self {
            lambda: preset.lambda(),
            dimension: None,
        }
    }

    /// Require every embedding to have exactly `dimension` entries.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Rerank with cosine similarity over the candidates' embeddings.
    pub fn rerank(
        &self,
        candidates: &[RerankCandidate],
        k: usize,
    ) -> Result<Vec<RerankedItem>, RerankError> {
        if let Some(first) = candidates.first() {
            let expected = self.dimension.unwrap_or(first.embedding.len());
            for c in candidates {
                check_embedding(&c.id, &c.embedding, expected)?;
            }
        }
        self.rerank_with(candidates, k, |a, b| {
            cosine_similarity(&a.embedding, &b.embedding)
        })
    }

    /// Rerank with a caller-supplied symmetric similarity.
    pub fn rerank_with<F>(
        &self,
        candidates: &[RerankCandidate],
        k: usize,
        similarity: F,
    ) -> Result<Vec<RerankedItem>, RerankError>
    where
        F: Fn(&RerankCandidate, &RerankCandidate) -> f64,
    {
        let mut seen = HashSet::with_capacity(candidates.len());
        for c in candidates {
            if !c.relevance.is_finite() {
                return Err(RerankError::NonFiniteRelevance {
                    id: c.id.clone(),
                    relevance: c.relevance,
                });
            }
            if !seen.insert(&c.id) {
                return Err(RerankError::DuplicateCandidate(c.id.clone()));
            }
        }

        let mut ordered: Vec<&RerankCandidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut pending: Vec<Pending<'_>> = ordered
            .into_iter()
            .enumerate()
            .map(|(idx, candidate)| Pending {
                candidate,
                rank: idx + 1,
                max_similarity: None,
            })
            .collect();

        // With no room to diversify the relevance order is the answer.
        let keep_order = k >= pending.len();
        let take = k.min(pending.len());

        let mut selected: Vec<RerankedItem> = Vec::with_capacity(take);
        while selected.len() < take {
            let pick = if keep_order {
                0
            } else {
                self.best_index(&pending)
            };
            let chosen = pending.remove(pick);
            let max_similarity = chosen.max_similarity.unwrap_or(0.0);
            for other in &mut pending {
                let sim = similarity(other.candidate, chosen.candidate);
                other.max_similarity = Some(match other.max_similarity {
                    Some(current) => current.max(sim),
                    None => sim,
                });
            }
            selected.push(RerankedItem {
                id: chosen.candidate.id.clone(),
                relevance_rank: chosen.rank,
                relevance: chosen.candidate.relevance,
                mmr_score: self.marginal(chosen.candidate.relevance, max_similarity),
                max_similarity,
            });
        }
        Ok(selected)
    }

    fn marginal(&self, relevance: f64, max_similarity: f64) -> f64 {
        self.lambda * relevance - (1.0 - self.lambda) * max_similarity
    }

    fn best_index(&self, pending: &[Pending<'_>]) -> usize {
        let mut best = 0;
        for idx in 1..pending.len() {
            if self.better(&pending[idx], &pending[best]) {
                best = idx;
            }
        }
        best
    }

    fn better(&self, a: &Pending<'_>, b: &Pending<'_>) -> bool {
        let score_a = self.marginal(a.candidate.relevance, a.max_similarity.unwrap_or(0.0));
        let score_b = self.marginal(b.candidate.relevance, b.max_similarity.unwrap_or(0.0));
        match score_a.total_cmp(&score_b) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => (a.rank, &a.candidate.id) < (b.rank, &b.candidate.id),
        }
    }
}
