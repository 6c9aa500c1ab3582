//! Weighted linear combination of nine normalized components.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RankingConfig, SignalWeights};
use crate::idea::{Idea, ScoreVector, Signal};
use crate::scoring::ScoreError;

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Elo,
    BayesianMean,
    Uncertainty,
    Sentiment,
    Provenance,
    Freshness,
    Trend,
    CausalImpact,
    Serendipity,
}

impl Component {
    pub const ALL: [Component; 9] = [
        Component::Elo,
        Component::BayesianMean,
        Component::Uncertainty,
        Component::Sentiment,
        Component::Provenance,
        Component::Freshness,
        Component::Trend,
        Component::CausalImpact,
        Component::Serendipity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elo => "elo",
            Self::BayesianMean => "bayesian_mean",
            Self::Uncertainty => "uncertainty",
            Self::Sentiment => "sentiment",
            Self::Provenance => "provenance",
            Self::Freshness => "freshness",
            Self::Trend => "trend",
            Self::CausalImpact => "causal_impact",
            Self::Serendipity => "serendipity",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentContribution {
    pub component: Component,
    /// Normalized component value.
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
    /// Share of `base_score` in percent; 0 when the base score is 0.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub base_score: f64,
    /// Freshness computed for `as_of`; callers write it back into the vector.
    pub freshness: f64,
    pub contributions: Vec<ComponentContribution>,
}

impl CompositeScore {
    pub fn contribution(&self, component: Component) -> Option<&ComponentContribution> {
        self.contributions.iter().find(|c| c.component == component)
    }

    /// Strongest `n` factors, largest contribution first.
    pub fn top_contributions(&self, n: usize) -> Vec<ComponentContribution> {
        let mut sorted = self.contributions.clone();
        sorted.sort_by(|a, b| {
            b.contribution
                .total_cmp(&a.contribution)
                .then_with(|| a.component.cmp(&b.component))
        });
        sorted.truncate(n);
        sorted
    }
}

#[derive(Debug, Clone)]
pub struct CompositeScorer {
    weights: SignalWeights,
    freshness_decay: f64,
    elo_reference: f64,
    prior_std: f64,
}

impl CompositeScorer {
    pub fn new(config: &RankingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            weights: config.weights,
            freshness_decay: config.freshness_decay,
            elo_reference: config.elo.reference,
            prior_std: config.bayesian.prior_std,
        })
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    /// `exp(-λ · age_days)`; ideas dated after `as_of` count as brand new.
    pub fn freshness(&self, created_at: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
        let age_ms = (as_of - created_at).num_milliseconds().max(0) as f64;
        (-self.freshness_decay * age_ms / MS_PER_DAY).exp()
    }

    pub fn score(
        &self,
        idea: &Idea,
        signals: &ScoreVector,
        as_of: DateTime<Utc>,
    ) -> Result<CompositeScore, ScoreError> {
        let elo = signals.require(Signal::Elo)?;
        let mean = signals.require(Signal::BayesianMean)?;
        let std = signals.require(Signal::BayesianStd)?;
        let sentiment = signals.require(Signal::Sentiment)?;
        let trend = signals.require(Signal::Trend)?;
        let causal = signals.require(Signal::CausalImpact)?;
        let provenance = signals.require(Signal::Provenance)?;
        let serendipity = signals.require(Signal::Serendipity)?;
        let freshness = self.freshness(idea.created_at, as_of);

        let normalized = |component: Component| -> f64 {
            match component {
                Component::Elo => elo / self.elo_reference,
                Component::BayesianMean => mean,
                Component::Uncertainty => (std / self.prior_std).min(1.0),
                Component::Sentiment => (sentiment + 1.0) / 2.0,
                Component::Provenance => provenance,
                Component::Freshness => freshness,
                Component::Trend => trend,
                Component::CausalImpact => causal,
                Component::Serendipity => serendipity,
            }
        };

        let mut contributions = Vec::with_capacity(Component::ALL.len());
        let mut base_score = 0.0;
        for component in Component::ALL {
            let value = normalized(component);
            let weight = self.weights.weight(component);
            let contribution = value * weight;
            base_score += contribution;
            contributions.push(ComponentContribution {
                component,
                value,
                weight,
                contribution,
                percentage: 0.0,
            });
        }
        if base_score > 0.0 {
            for c in &mut contributions {
                c.percentage = c.contribution / base_score * 100.0;
            }
        }

        Ok(CompositeScore {
            base_score,
            freshness,
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn idea(created_at: DateTime<Utc>) -> Idea {
        Idea::new("t", "d", "a", created_at, vec![])
    }

    fn full_vector() -> ScoreVector {
        ScoreVector::initial(1500.0, 0.5, 0.3)
            .with(Signal::Sentiment, 0.0)
            .with(Signal::Trend, 0.5)
            .with(Signal::CausalImpact, 0.5)
            .with(Signal::Provenance, 0.5)
            .with(Signal::Serendipity, 0.5)
    }

    #[test]
    fn neutral_inputs_score_as_weighted_sum() {
        let scorer = CompositeScorer::new(&RankingConfig::default()).unwrap();
        let score = scorer.score(&idea(as_of()), &full_vector(), as_of()).unwrap();
        // elo and uncertainty and freshness normalize to 1.0, the rest to 0.5
        let expected = 0.15 + 0.05 + 0.10 + 0.5 * (0.15 + 0.10 + 0.10 + 0.15 + 0.10 + 0.10);
        assert!((score.base_score - expected).abs() < 1e-12);
        assert_eq!(score.freshness, 1.0);
        let pct: f64 = score.contributions.iter().map(|c| c.percentage).sum();
        assert!((pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn freshness_decays_per_day_and_clamps_future() {
        let scorer = CompositeScorer::new(&RankingConfig::default()).unwrap();
        let ten_days = scorer.freshness(as_of() - Duration::days(10), as_of());
        assert!((ten_days - (-0.1f64).exp()).abs() < 1e-12);
        assert_eq!(scorer.freshness(as_of() + Duration::days(3), as_of()), 1.0);
    }

    #[test]
    fn missing_and_out_of_range_signals_are_rejected() {
        let scorer = CompositeScorer::new(&RankingConfig::default()).unwrap();
        let mut v = full_vector();
        v.remove(Signal::Trend);
        assert_eq!(
            scorer.score(&idea(as_of()), &v, as_of()).unwrap_err(),
            ScoreError::MissingSignal {
                signal: Signal::Trend
            }
        );

        let v = full_vector().with(Signal::Sentiment, 1.5);
        assert!(matches!(
            scorer.score(&idea(as_of()), &v, as_of()),
            Err(ScoreError::InputRange {
                signal: Signal::Sentiment,
                ..
            })
        ));
    }

    #[test]
    fn uncertainty_bonus_saturates_at_prior() {
        let scorer = CompositeScorer::new(&RankingConfig::default()).unwrap();
        let settled = full_vector().with(Signal::BayesianStd, 0.15);
        let score = scorer.score(&idea(as_of()), &settled, as_of()).unwrap();
        let u = score.contribution(Component::Uncertainty).unwrap();
        assert!((u.value - 0.5).abs() < 1e-12);

        let wide = full_vector().with(Signal::BayesianStd, 2.0);
        let score = scorer.score(&idea(as_of()), &wide, as_of()).unwrap();
        assert_eq!(score.contribution(Component::Uncertainty).unwrap().value, 1.0);
    }

    #[test]
    fn top_contributions_orders_by_size() {
        let scorer = CompositeScorer::new(&RankingConfig::default()).unwrap();
        let v = full_vector().with(Signal::Trend, 1.0);
        let score = scorer.score(&idea(as_of()), &v, as_of()).unwrap();
        let top = score.top_contributions(2);
        assert_eq!(top.len(), 2);
        assert!(top[0].contribution >= top[1].contribution);
        assert!(top
            .iter()
            .any(|c| c.component == Component::Trend || c.component == Component::Elo));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = RankingConfig::default();
        cfg.weights.serendipity = 0.04;
        assert!(CompositeScorer::new(&cfg).is_err());
    }
}
