//! Diversity reranking of the top scored candidates.
//!
//! Maximal marginal relevance trades each candidate's relevance against its
//! closest already-selected neighbour. Cosine similarity over embeddings is
//! the default; any symmetric similarity can be supplied instead.
//! [`evaluation`] scores a finished ranking against a reference ordering.

pub mod evaluation;
pub mod mmr;

pub use evaluation::{
    evaluate_ranking, evaluate_response, intra_list_diversity, CutoffMetrics, EvaluationError,
    EvaluationMetrics,
};
pub use mmr::{
    check_embedding, cosine_similarity, DiversityReranker, MmrPreset, RerankCandidate,
    RerankedItem,
};

use crate::idea::IdeaId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RerankError {
    #[error("mmr lambda must be in [0,1] (got {0})")]
    InvalidLambda(f64),
    #[error("embedding for {id} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        id: IdeaId,
        expected: usize,
        actual: usize,
    },
    #[error("candidate {0} appears more than once")]
    DuplicateCandidate(IdeaId),
    #[error("candidate {id} has non-finite relevance {relevance}")]
    NonFiniteRelevance { id: IdeaId, relevance: f64 },
    #[error("embedding for {id} has a non-finite component")]
    NonFiniteEmbedding { id: IdeaId },
}
