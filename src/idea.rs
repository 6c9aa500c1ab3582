//! Idea records and the per-idea signal vector consumed by scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing::HashAlgorithm;
use crate::scoring::ScoreError;

/// Hex characters kept from the identity digest.
const ID_HEX_LEN: usize = 32;

// =============================================================================
// Identity
// =============================================================================

/// Content-derived identifier; the join key across ratings, scoring, and the chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeaId(String);

impl IdeaId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the stable identifier from normalized title and description.
    ///
    /// Always BLAKE3 regardless of the configured chain algorithm, so that
    /// switching the chain hash never re-keys existing ideas.
    pub fn derive(title: &str, description: &str) -> Self {
        let title = normalize_text(title);
        let description = normalize_text(description);
        let digest = HashAlgorithm::Blake3.hash_fields(&[&title, &description]);
        Self(digest[..ID_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdeaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lowercase, trim, and collapse internal whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Signals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Elo,
    BayesianMean,
    BayesianStd,
    Sentiment,
    Freshness,
    Trend,
    CausalImpact,
    Provenance,
    Serendipity,
    EthicsScore,
    FeasibilityScore,
}

/// Closed interval a signal must lie in before it is combined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRange {
    pub min: f64,
    pub max: f64,
}

impl SignalRange {
    pub const UNIT: Self = Self { min: 0.0, max: 1.0 };
    pub const POLARITY: Self = Self {
        min: -1.0,
        max: 1.0,
    };
    pub const NON_NEGATIVE: Self = Self {
        min: 0.0,
        max: f64::INFINITY,
    };

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl Signal {
    pub const ALL: [Signal; 11] = [
        Signal::Elo,
        Signal::BayesianMean,
        Signal::BayesianStd,
        Signal::Sentiment,
        Signal::Freshness,
        Signal::Trend,
        Signal::CausalImpact,
        Signal::Provenance,
        Signal::Serendipity,
        Signal::EthicsScore,
        Signal::FeasibilityScore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elo => "elo",
            Self::BayesianMean => "bayesian_mean",
            Self::BayesianStd => "bayesian_std",
            Self::Sentiment => "sentiment",
            Self::Freshness => "freshness",
            Self::Trend => "trend",
            Self::CausalImpact => "causal_impact",
            Self::Provenance => "provenance",
            Self::Serendipity => "serendipity",
            Self::EthicsScore => "ethics_score",
            Self::FeasibilityScore => "feasibility_score",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn range(self) -> SignalRange {
        match self {
            Self::Elo | Self::BayesianStd => SignalRange::NON_NEGATIVE,
            Self::Sentiment => SignalRange::POLARITY,
            _ => SignalRange::UNIT,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check `value` against the documented range for `signal`.
pub fn check_signal(signal: Signal, value: f64) -> Result<f64, ScoreError> {
    let range = signal.range();
    if range.contains(value) {
        Ok(value)
    } else {
        Err(ScoreError::InputRange {
            signal,
            value,
            min: range.min,
            max: range.max,
        })
    }
}

// =============================================================================
// ScoreVector
// =============================================================================

/// Signal name → value. Values are stored as supplied and range-checked when read
/// through [`ScoreVector::require`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreVector {
    values: BTreeMap<Signal, f64>,
}

impl ScoreVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vector for an idea entering the system: rating priors and full freshness.
    pub fn initial(elo: f64, bayesian_mean: f64, bayesian_std: f64) -> Self {
        Self::new()
            .with(Signal::Elo, elo)
            .with(Signal::BayesianMean, bayesian_mean)
            .with(Signal::BayesianStd, bayesian_std)
            .with(Signal::Freshness, 1.0)
    }

    pub fn with(mut self, signal: Signal, value: f64) -> Self {
        self.values.insert(signal, value);
        self
    }

    pub fn set(&mut self, signal: Signal, value: f64) -> Option<f64> {
        self.values.insert(signal, value)
    }

    pub fn get(&self, signal: Signal) -> Option<f64> {
        self.values.get(&signal).copied()
    }

    pub fn remove(&mut self, signal: Signal) -> Option<f64> {
        self.values.remove(&signal)
    }

    /// Present and inside its documented range, or an error naming the signal.
    pub fn require(&self, signal: Signal) -> Result<f64, ScoreError> {
        let value = self
            .get(signal)
            .ok_or(ScoreError::MissingSignal { signal })?;
        check_signal(signal, value)
    }

    /// Overlay `other` onto `self`; values in `other` win.
    pub fn merge(&mut self, other: &ScoreVector) {
        for (signal, value) in &other.values {
            self.values.insert(*signal, *value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, f64)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Range-check every present signal.
    pub fn validate(&self) -> Result<(), ScoreError> {
        for (signal, value) in self.iter() {
            check_signal(signal, value)?;
        }
        Ok(())
    }

    /// Digest of the canonical (key-ordered) JSON form.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_string(&self.values)?;
        Ok(algorithm.hash_text(&canonical))
    }
}

// =============================================================================
// Idea
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub scores: ScoreVector,
}

impl Idea {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        embedding: Vec<f32>,
    ) -> Self {
        let title = title.into();
        let description = description.into();
        Self {
            id: IdeaId::derive(&title, &description),
            title,
            description,
            tags: BTreeSet::new(),
            author: author.into(),
            created_at,
            embedding,
            scores: ScoreVector::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scores(mut self, scores: ScoreVector) -> Self {
        self.scores = scores;
        self
    }

    /// Integrity hash over the stored fields; this is what the chain records.
    pub fn content_hash(&self, algorithm: HashAlgorithm) -> String {
        let created = self.created_at.timestamp_millis().to_string();
        let tag_count = self.tags.len().to_string();
        let mut fields: Vec<&str> = vec![
            self.id.as_str(),
            &self.title,
            &self.description,
            &self.author,
            &created,
            &tag_count,
        ];
        fields.extend(self.tags.iter().map(String::as_str));
        algorithm.hash_fields(&fields)
    }
}
