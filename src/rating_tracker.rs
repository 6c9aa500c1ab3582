//! Rating tracker: Elo from pairwise outcomes, conjugate normal updates from stars.
//!
//! Single writer per update: `record_*` hold the write lock for the whole
//! read-modify-write, `get`/`snapshot` copy values out under the read lock.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::config::{BayesianConfig, ConfigError, EloConfig, RankingConfig};
use crate::idea::IdeaId;

/// Logistic base and scale of the expected-score curve.
const ELO_BASE: f64 = 10.0;
const ELO_SCALE: f64 = 400.0;

// ---------------------------------------------------------------------
//  Records
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub elo: f64,
    pub bayesian_mean: f64,
    pub bayesian_std: f64,
    /// Feedback events of either kind.
    pub count: u64,
    /// Star ratings folded into the Bayesian estimate.
    pub ratings: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingParams {
    pub elo: EloConfig,
    pub bayesian: BayesianConfig,
}

impl From<&RankingConfig> for RatingParams {
    fn from(config: &RankingConfig) -> Self {
        Self {
            elo: config.elo,
            bayesian: config.bayesian,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonOutcome {
    pub winner: RatingRecord,
    pub loser: RatingRecord,
    /// Win probability the winner had before the update.
    pub expected_winner: f64,
    /// Points gained by the winner (before floor clamping of the loser).
    pub delta: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("idea {0} cannot be compared with itself")]
    SelfComparison(IdeaId),
    #[error("star rating must be within 1..=5 (got {0})")]
    InvalidStars(u8),
    #[error("rating tracker lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stored rating for {id} is unusable: {reason}")]
    InvalidRecord { id: IdeaId, reason: String },
}

/// Logistic expected score of `a` against `b`.
pub fn expected_score(a: f64, b: f64) -> f64 {
    1.0 / (1.0 + ELO_BASE.powf((b - a) / ELO_SCALE))
}

fn check_record(params: &RatingParams, record: &RatingRecord) -> Result<(), String> {
    if !record.elo.is_finite() || record.elo < params.elo.floor {
        return Err(format!(
            "elo {} must be finite and >= {}",
            record.elo, params.elo.floor
        ));
    }
    if !record.bayesian_mean.is_finite() || !(0.0..=1.0).contains(&record.bayesian_mean) {
        return Err(format!("bayesian_mean {} must be in [0,1]", record.bayesian_mean));
    }
    if !record.bayesian_std.is_finite() || record.bayesian_std <= 0.0 {
        return Err(format!("bayesian_std {} must be > 0", record.bayesian_std));
    }
    if record.ratings > record.count {
        return Err(format!(
            "ratings {} exceed feedback count {}",
            record.ratings, record.count
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------
//  Tracker
// ---------------------------------------------------------------------

#[derive(Debug)]
pub struct RatingTracker {
    params: RatingParams,
    records: RwLock<HashMap<IdeaId, RatingRecord>>,
}

impl RatingTracker {
    pub fn new(config: &RankingConfig) -> Result<Self, RatingError> {
        Self::with_records(config, HashMap::new())
    }

    /// Warm start from previously persisted records.
    ///
    /// Every record is checked against the configured bounds; a std of zero
    /// or a non-finite value would poison later updates.
    pub fn with_records(
        config: &RankingConfig,
        records: HashMap<IdeaId, RatingRecord>,
    ) -> Result<Self, RatingError> {
        config.validate()?;
        let params = RatingParams::from(config);
        for (id, record) in &records {
            check_record(&params, record).map_err(|reason| RatingError::InvalidRecord {
                id: id.clone(),
                reason,
            })?;
        }
        Ok(Self {
            params,
            records: RwLock::new(records),
        })
    }

    pub fn params(&self) -> &RatingParams {
        &self.params
    }

    /// Record returned for ideas that have received no feedback yet.
    pub fn prior(&self) -> RatingRecord {
        RatingRecord {
            elo: self.params.elo.initial,
            bayesian_mean: self.params.bayesian.prior_mean,
            bayesian_std: self.params.bayesian.prior_std,
            count: 0,
            ratings: 0,
        }
    }

    pub fn get(&self, id: &IdeaId) -> Result<RatingRecord, RatingError> {
        let records = self.records.read().map_err(|_| RatingError::Poisoned)?;
        Ok(records.get(id).copied().unwrap_or_else(|| self.prior()))
    }

    pub fn record_comparison(
        &self,
        winner: &IdeaId,
        loser: &IdeaId,
    ) -> Result<ComparisonOutcome, RatingError> {
        if winner == loser {
            return Err(RatingError::SelfComparison(winner.clone()));
        }
        let mut records = self.records.write().map_err(|_| RatingError::Poisoned)?;
        let mut w = records.get(winner).copied().unwrap_or_else(|| self.prior());
        let mut l = records.get(loser).copied().unwrap_or_else(|| self.prior());

        let expected_winner = expected_score(w.elo, l.elo);
        let delta = self.params.elo.k_factor * (1.0 - expected_winner);
        let floor = self.params.elo.floor;
        w.elo = (w.elo + delta).max(floor);
        l.elo = (l.elo - delta).max(floor);
        w.count += 1;
        l.count += 1;

        records.insert(winner.clone(), w);
        records.insert(loser.clone(), l);
        Ok(ComparisonOutcome {
            winner: w,
            loser: l,
            expected_winner,
            delta,
        })
    }

    /// Fold a 1..=5 star rating into the idea's normal estimate.
    pub fn record_rating(&self, id: &IdeaId, stars: u8) -> Result<RatingRecord, RatingError> {
        if !(1..=5).contains(&stars) {
            return Err(RatingError::InvalidStars(stars));
        }
        let evidence = f64::from(stars - 1) / 4.0;
        let obs_var = self.params.bayesian.observation_std.powi(2);

        let mut records = self.records.write().map_err(|_| RatingError::Poisoned)?;
        let mut record = records.get(id).copied().unwrap_or_else(|| self.prior());
        let prior_var = record.bayesian_std.powi(2);
        let precision = 1.0 / prior_var + 1.0 / obs_var;
        record.bayesian_mean = (record.bayesian_mean / prior_var + evidence / obs_var) / precision;
        record.bayesian_std = (1.0 / precision).sqrt();
        record.count += 1;
        record.ratings += 1;

        records.insert(id.clone(), record);
        Ok(record)
    }

    /// Consistent copy of every tracked record.
    pub fn snapshot(&self) -> Result<HashMap<IdeaId, RatingRecord>, RatingError> {
        let records = self.records.read().map_err(|_| RatingError::Poisoned)?;
        Ok(records.clone())
    }

    pub fn len(&self) -> Result<usize, RatingError> {
        let records = self.records.read().map_err(|_| RatingError::Poisoned)?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool, RatingError> {
        Ok(self.len()? == 0)
    }
}
