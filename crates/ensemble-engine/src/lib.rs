//! Confidence-weighted ensemble valuation.
//!
//! Combines the 24 scenario results into one fair value using per-model
//! weights resolved from the weight store (company override > industry >
//! global > default table), scenario weights derived from the recent trend,
//! and the per-result confidences.

pub mod features;
pub mod net;
mod engine;

pub use engine::{EnsembleEngine, EnsembleProviders};
pub use net::WeightNet;
