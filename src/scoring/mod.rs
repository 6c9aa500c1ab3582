//! Composite scoring and post-score enhancement.
//!
//! Both stages are pure: they hold validated configuration only and can be
//! shared across threads.

pub mod composite;
pub mod enhance;

pub use composite::{Component, ComponentContribution, CompositeScore, CompositeScorer};
pub use enhance::{Enhancement, EnhancementPipeline};

use crate::idea::Signal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("missing required signal `{signal}`")]
    MissingSignal { signal: Signal },
    #[error("signal `{signal}` = {value} is outside [{min}, {max}]")]
    InputRange {
        signal: Signal,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("base score must be finite and >= 0 (got {0})")]
    InvalidBaseScore(f64),
}
