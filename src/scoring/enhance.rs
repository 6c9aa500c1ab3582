//! Ethics, feasibility, and causal adjustments applied to a base score.

use serde::{Deserialize, Serialize};

use crate::config::{CausalBoostConfig, ConfigError, EthicsBand, FeasibilityBounds, RankingConfig};
use crate::idea::{check_signal, Signal};
use crate::scoring::ScoreError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Enhancement {
    pub base_score: f64,
    pub ethics_multiplier: f64,
    pub feasibility_multiplier: f64,
    pub causal_boost: f64,
    pub adjusted_score: f64,
    /// True when `adjusted_score` was capped at the configured maximum.
    pub clipped: bool,
}

#[derive(Debug, Clone)]
pub struct EnhancementPipeline {
    ethics_bands: Vec<EthicsBand>,
    feasibility: FeasibilityBounds,
    causal: CausalBoostConfig,
    max_adjusted_score: f64,
}

impl EnhancementPipeline {
    pub fn new(config: &RankingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ethics_bands: config.ethics_bands.clone(),
            feasibility: config.feasibility,
            causal: config.causal_boost,
            max_adjusted_score: config.max_adjusted_score,
        })
    }

    /// Step lookup: first band whose lower bound the score reaches.
    pub fn ethics_multiplier(&self, ethics: f64) -> f64 {
        self.ethics_bands
            .iter()
            .find(|band| ethics >= band.min_score)
            .or(self.ethics_bands.last())
            .map(|band| band.multiplier)
            .unwrap_or(1.0)
    }

    pub fn feasibility_multiplier(&self, feasibility: f64) -> f64 {
        let FeasibilityBounds { floor, ceiling } = self.feasibility;
        floor + (ceiling - floor) * feasibility
    }

    pub fn causal_boost(&self, causal: f64) -> f64 {
        (causal * self.causal.gain).min(self.causal.cap)
    }

    pub fn enhance(
        &self,
        base_score: f64,
        ethics: f64,
        feasibility: f64,
        causal: f64,
    ) -> Result<Enhancement, ScoreError> {
        if !base_score.is_finite() || base_score < 0.0 {
            return Err(ScoreError::InvalidBaseScore(base_score));
        }
        let ethics = check_signal(Signal::EthicsScore, ethics)?;
        let feasibility = check_signal(Signal::FeasibilityScore, feasibility)?;
        let causal = check_signal(Signal::CausalImpact, causal)?;

        let ethics_multiplier = self.ethics_multiplier(ethics);
        let feasibility_multiplier = self.feasibility_multiplier(feasibility);
        let causal_boost = self.causal_boost(causal);
        let raw = base_score * ethics_multiplier * feasibility_multiplier + causal_boost;
        let clipped = raw > self.max_adjusted_score;

        Ok(Enhancement {
            base_score,
            ethics_multiplier,
            feasibility_multiplier,
            causal_boost,
            adjusted_score: raw.min(self.max_adjusted_score),
            clipped,
        })
    }
}
