//! The eight fair-value estimators and the scenario executor.
//!
//! Each model is a pure function of [`ModelInputs`]: no I/O, no clock. A
//! model that cannot price the company returns `fair_value: None` with a
//! machine-readable reason instead of erroring, and the ensemble degrades
//! around it.

pub mod inputs;
pub mod models;
pub mod scenario;

pub use inputs::{ModelEstimate, ModelInputs};
pub use scenario::{ScenarioAdjustment, ScenarioExecutor, ScenarioRun};
