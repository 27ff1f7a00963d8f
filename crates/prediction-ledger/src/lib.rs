//! SQLite persistence for the core-owned state.
//!
//! Predictions and weight vectors are append-only: the only updates ever
//! issued are the retire transition on a superseded vector and the one-shot
//! outcome attachment. Industry profiles are overwritten on refresh.

mod store;
mod reconciler;

pub use reconciler::{snap_to_business_day, OutcomeReconciler};
pub use store::SqliteLedger;
