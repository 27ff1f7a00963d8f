//! Self-training loop for the ensemble model weights.
//!
//! The daily trainer fits candidate weights to realised prediction error,
//! cross-validates them, backtests against the active vector, and only
//! deploys through the A/B gate with exponential smoothing. The industry
//! trainer runs the same pipeline per industry and fills thin industries by
//! similarity transfer or the meta-learner.

mod trainer;
pub mod industry;

pub use trainer::{TrainOutcome, TrainScope, TrainerConfig, WeightTrainer};
pub use industry::{IndustryTrainer, IndustryTrainingSummary};
