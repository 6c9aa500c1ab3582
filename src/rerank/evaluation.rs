//! Offline quality metrics for a ranked list against a reference ordering.
//!
//! Ground truth is an ordered id list, best first. Relevance is graded: the
//! idea at ground-truth position `i` of `n` is worth `n - i`.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::idea::{Idea, IdeaId};
use crate::pipeline::RankingResponse;
use crate::rerank::cosine_similarity;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("ranked list is empty")]
    EmptyRanking,
    #[error("ground truth is empty")]
    EmptyGroundTruth,
    #[error("cutoff k must be at least 1")]
    ZeroCutoff,
    #[error("{0} appears more than once in the ground truth")]
    DuplicateGroundTruth(IdeaId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CutoffMetrics {
    /// Requested cutoff.
    pub k: usize,
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub at: Vec<CutoffMetrics>,
    /// Share of ground-truth ids present anywhere in the ranking.
    pub coverage: f64,
    /// `1 - mean pairwise cosine` over the ranked embeddings; `None` with
    /// fewer than two embeddings.
    pub intra_list_diversity: Option<f64>,
}

impl EvaluationMetrics {
    pub fn at_k(&self, k: usize) -> Option<&CutoffMetrics> {
        self.at.iter().find(|m| m.k == k)
    }
}

/// Score `ranked` against `ground_truth` at each cutoff in `cutoffs`.
///
/// Cutoffs beyond the ranking length are evaluated at the ranking length.
pub fn evaluate_ranking(
    ranked: &[IdeaId],
    ground_truth: &[IdeaId],
    cutoffs: &[usize],
) -> Result<EvaluationMetrics, EvaluationError> {
    if ranked.is_empty() {
        return Err(EvaluationError::EmptyRanking);
    }
    if ground_truth.is_empty() {
        return Err(EvaluationError::EmptyGroundTruth);
    }
    let mut grades: HashMap<&IdeaId, f64> = HashMap::with_capacity(ground_truth.len());
    let n = ground_truth.len();
    for (idx, id) in ground_truth.iter().enumerate() {
        if grades.insert(id, (n - idx) as f64).is_some() {
            return Err(EvaluationError::DuplicateGroundTruth(id.clone()));
        }
    }

    let mut at = Vec::with_capacity(cutoffs.len());
    for &k in cutoffs {
        if k == 0 {
            return Err(EvaluationError::ZeroCutoff);
        }
        let head = &ranked[..k.min(ranked.len())];
        let hits = head.iter().filter(|id| grades.contains_key(id)).count() as f64;
        let precision = hits / head.len() as f64;
        let recall = hits / n as f64;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        at.push(CutoffMetrics {
            k,
            ndcg: ndcg(head, &grades, n),
            precision,
            recall,
            f1,
        });
    }

    let present: HashSet<&IdeaId> = ranked.iter().collect();
    let covered = ground_truth.iter().filter(|id| present.contains(id)).count();

    Ok(EvaluationMetrics {
        at,
        coverage: covered as f64 / n as f64,
        intra_list_diversity: None,
    })
}

/// Evaluate a ranking run; `ideas` supplies embeddings for the diversity term.
pub fn evaluate_response(
    response: &RankingResponse,
    ideas: &[Idea],
    ground_truth: &[IdeaId],
    cutoffs: &[usize],
) -> Result<EvaluationMetrics, EvaluationError> {
    let ranked: Vec<IdeaId> = response.results.iter().map(|r| r.idea_id.clone()).collect();
    let mut metrics = evaluate_ranking(&ranked, ground_truth, cutoffs)?;

    let by_id: HashMap<&IdeaId, &Idea> = ideas.iter().map(|i| (&i.id, i)).collect();
    let embeddings: Vec<&[f32]> = ranked
        .iter()
        .filter_map(|id| by_id.get(id).map(|idea| idea.embedding.as_slice()))
        .collect();
    metrics.intra_list_diversity = intra_list_diversity(&embeddings);
    Ok(metrics)
}

pub fn intra_list_diversity(embeddings: &[&[f32]]) -> Option<f64> {
    if embeddings.len() < 2 {
        return None;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in embeddings.iter().enumerate() {
        for b in &embeddings[i + 1..] {
            total += cosine_similarity(a, b);
            pairs += 1;
        }
    }
    Some(1.0 - total / pairs as f64)
}

fn ndcg(head: &[IdeaId], grades: &HashMap<&IdeaId, f64>, n: usize) -> f64 {
    let dcg: f64 = head
        .iter()
        .enumerate()
        .filter_map(|(pos, id)| grades.get(id).map(|g| g / discount(pos)))
        .sum();
    let ideal: f64 = (0..head.len().min(n))
        .map(|pos| (n - pos) as f64 / discount(pos))
        .sum();
    if ideal > 0.0 {
        dcg / ideal
    } else {
        0.0
    }
}

fn discount(position: usize) -> f64 {
    (position as f64 + 2.0).log2()
}
