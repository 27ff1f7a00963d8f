//! Composite fundamental scoring and ranking.
//!
//! Five dimensions (valuation, profitability, growth, health, risk) each
//! scored 0-100 from the ratio set, combined by dimension weights that are
//! either the defaults or the forest learner's published importances.

pub mod forest;
mod scorer;

pub use scorer::{rank_scored, IndustryBenchmarks, RiskInputs, Scorer, DEFAULT_DIMENSION_WEIGHTS};
pub use forest::{DimensionWeightLearner, LearnedDimensionWeights};
