//! Ranking configuration: loaded once, validated at startup, never clamped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hashing::HashAlgorithm;
use crate::scoring::Component;

/// Lower bound for every composite weight.
pub const MIN_WEIGHT: f64 = 0.05;
/// Upper bound for every composite weight.
pub const MAX_WEIGHT: f64 = 0.25;
/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

// =============================================================================
// Sections
// =============================================================================

/// Coefficients of the nine composite components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalWeights {
    pub elo: f64,
    pub bayesian_mean: f64,
    pub uncertainty: f64,
    pub sentiment: f64,
    pub provenance: f64,
    pub freshness: f64,
    pub trend: f64,
    pub causal_impact: f64,
    pub serendipity: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            elo: 0.15,
            bayesian_mean: 0.15,
            uncertainty: 0.05,
            sentiment: 0.10,
            provenance: 0.10,
            freshness: 0.10,
            trend: 0.15,
            causal_impact: 0.10,
            serendipity: 0.10,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, component: Component) -> f64 {
        match component {
            Component::Elo => self.elo,
            Component::BayesianMean => self.bayesian_mean,
            Component::Uncertainty => self.uncertainty,
            Component::Sentiment => self.sentiment,
            Component::Provenance => self.provenance,
            Component::Freshness => self.freshness,
            Component::Trend => self.trend,
            Component::CausalImpact => self.causal_impact,
            Component::Serendipity => self.serendipity,
        }
    }

    pub fn set(&mut self, component: Component, value: f64) {
        let slot = match component {
            Component::Elo => &mut self.elo,
            Component::BayesianMean => &mut self.bayesian_mean,
            Component::Uncertainty => &mut self.uncertainty,
            Component::Sentiment => &mut self.sentiment,
            Component::Provenance => &mut self.provenance,
            Component::Freshness => &mut self.freshness,
            Component::Trend => &mut self.trend,
            Component::CausalImpact => &mut self.causal_impact,
            Component::Serendipity => &mut self.serendipity,
        };
        *slot = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::ALL.into_iter().map(|c| (c, self.weight(c)))
    }

    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, w)| w).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (component, w) in self.iter() {
            if !w.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&w) {
                return Err(invalid(format!(
                    "weight `{component}` = {w} must be in [{MIN_WEIGHT}, {MAX_WEIGHT}]"
                )));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(format!("weights must sum to 1.0 (got {sum:.12})")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EloConfig {
    pub k_factor: f64,
    pub initial: f64,
    /// Ratings never drop below this.
    pub floor: f64,
    /// Divisor used to normalize elo before combination.
    pub reference: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k_factor: 32.0,
            initial: 1500.0,
            floor: 100.0,
            reference: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BayesianConfig {
    pub prior_mean: f64,
    pub prior_std: f64,
    /// Noise of a single star rating on the [0,1] evidence scale.
    pub observation_std: f64,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            prior_mean: 0.5,
            prior_std: 0.3,
            observation_std: 0.25,
        }
    }
}

/// One step of the ethics multiplier table; applies when `score >= min_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EthicsBand {
    pub min_score: f64,
    pub multiplier: f64,
}

pub fn default_ethics_bands() -> Vec<EthicsBand> {
    vec![
        EthicsBand {
            min_score: 0.8,
            multiplier: 1.0,
        },
        EthicsBand {
            min_score: 0.6,
            multiplier: 0.9,
        },
        EthicsBand {
            min_score: 0.4,
            multiplier: 0.7,
        },
        EthicsBand {
            min_score: 0.0,
            multiplier: 0.5,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeasibilityBounds {
    /// Multiplier at feasibility 0.
    pub floor: f64,
    /// Multiplier at feasibility 1.
    pub ceiling: f64,
}

impl Default for FeasibilityBounds {
    fn default() -> Self {
        Self {
            floor: 0.6,
            ceiling: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CausalBoostConfig {
    pub gain: f64,
    pub cap: f64,
}

impl Default for CausalBoostConfig {
    fn default() -> Self {
        Self {
            gain: 0.2,
            cap: 0.1,
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    pub weights: SignalWeights,
    /// Freshness decay rate λ per day.
    pub freshness_decay: f64,
    pub elo: EloConfig,
    pub bayesian: BayesianConfig,
    /// Ordered from highest `min_score` down; the last band must start at 0.
    pub ethics_bands: Vec<EthicsBand>,
    pub feasibility: FeasibilityBounds,
    pub causal_boost: CausalBoostConfig,
    pub max_adjusted_score: f64,
    pub mmr_lambda: f64,
    /// Top-N by adjusted score handed to the diversity reranker.
    pub candidate_pool: usize,
    pub embedding_dim: usize,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            freshness_decay: 0.01,
            elo: EloConfig::default(),
            bayesian: BayesianConfig::default(),
            ethics_bands: default_ethics_bands(),
            feasibility: FeasibilityBounds::default(),
            causal_boost: CausalBoostConfig::default(),
            max_adjusted_score: 2.0,
            mmr_lambda: 0.5,
            candidate_pool: 50,
            embedding_dim: 384,
            hash_algorithm: HashAlgorithm::Blake3,
        }
    }
}

impl RankingConfig {
    /// Load from `.toml` or JSON (any other extension) and validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: RankingConfig = if is_toml {
            toml::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RankingConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RankingConfig = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;

        if !self.freshness_decay.is_finite() || self.freshness_decay < 0.0 {
            return Err(invalid("freshness_decay must be a finite value >= 0"));
        }

        let elo = &self.elo;
        if !elo.k_factor.is_finite() || elo.k_factor <= 0.0 {
            return Err(invalid("elo.k_factor must be > 0"));
        }
        if !elo.floor.is_finite() || elo.floor < 0.0 {
            return Err(invalid("elo.floor must be >= 0"));
        }
        if !elo.initial.is_finite() || elo.initial < elo.floor {
            return Err(invalid("elo.initial must be >= elo.floor"));
        }
        if !elo.reference.is_finite() || elo.reference <= 0.0 {
            return Err(invalid("elo.reference must be > 0"));
        }

        let bayes = &self.bayesian;
        if !(0.0..=1.0).contains(&bayes.prior_mean) {
            return Err(invalid("bayesian.prior_mean must be in [0,1]"));
        }
        if !bayes.prior_std.is_finite() || bayes.prior_std <= 0.0 {
            return Err(invalid("bayesian.prior_std must be > 0"));
        }
        if !bayes.observation_std.is_finite() || bayes.observation_std <= 0.0 {
            return Err(invalid("bayesian.observation_std must be > 0"));
        }

        validate_ethics_bands(&self.ethics_bands)?;

        let feas = &self.feasibility;
        if !feas.floor.is_finite() || !feas.ceiling.is_finite() {
            return Err(invalid("feasibility bounds must be finite"));
        }
        if feas.floor <= 0.0 || feas.floor > feas.ceiling {
            return Err(invalid("feasibility bounds must satisfy 0 < floor <= ceiling"));
        }

        let causal = &self.causal_boost;
        if !causal.gain.is_finite() || causal.gain < 0.0 {
            return Err(invalid("causal_boost.gain must be >= 0"));
        }
        if !causal.cap.is_finite() || causal.cap < 0.0 {
            return Err(invalid("causal_boost.cap must be >= 0"));
        }

        if !self.max_adjusted_score.is_finite() || self.max_adjusted_score <= 0.0 {
            return Err(invalid("max_adjusted_score must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(invalid("mmr_lambda must be in [0,1]"));
        }
        if self.candidate_pool == 0 {
            return Err(invalid("candidate_pool must be >= 1"));
        }
        if self.embedding_dim == 0 {
            return Err(invalid("embedding_dim must be >= 1"));
        }
        Ok(())
    }
}

fn validate_ethics_bands(bands: &[EthicsBand]) -> Result<(), ConfigError> {
    let last = bands
        .last()
        .ok_or_else(|| invalid("ethics_bands must not be empty"))?;
    for band in bands {
        if !(0.0..=1.0).contains(&band.min_score) {
            return Err(invalid(format!(
                "ethics band min_score {} must be in [0,1]",
                band.min_score
            )));
        }
        if !band.multiplier.is_finite() || band.multiplier <= 0.0 {
            return Err(invalid(format!(
                "ethics band multiplier {} must be > 0",
                band.multiplier
            )));
        }
    }
    for pair in bands.windows(2) {
        if pair[1].min_score >= pair[0].min_score {
            return Err(invalid(
                "ethics_bands must be ordered by strictly decreasing min_score",
            ));
        }
        if pair[1].multiplier > pair[0].multiplier {
            return Err(invalid(
                "ethics band multipliers must not increase as min_score decreases",
            ));
        }
    }
    if last.min_score != 0.0 {
        return Err(invalid("the last ethics band must start at 0.0"));
    }
    Ok(())
}
