//! Feature assembly for the weighting network and the training pipeline.

use rust_decimal::prelude::ToPrimitive;

use valuation_core::stats;
use valuation_core::types::MODEL_COUNT;
use valuation_models::ScenarioRun;

/// Width of the ensemble feature vector.
pub const FEATURE_COUNT: usize = 20;

/// Assemble the 20 features: per-model scenario coherence (8), dispersion of
/// the 24 values (3), mean confidence (1), recent per-model accuracy (8).
pub fn build_features(run: &ScenarioRun, recent_accuracy: &[f64; MODEL_COUNT]) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_COUNT);

    features.extend_from_slice(&run.coherence);

    let values: Vec<f64> = run
        .results
        .iter()
        .filter_map(|r| r.fair_value)
        .filter_map(|d| d.to_f64())
        .filter(|v| v.is_finite())
        .collect();

    if values.len() >= 2 {
        let mean = stats::mean(&values);
        let scale = mean.abs().max(f64::EPSILON);
        let std_ratio = stats::std_dev_pop(&values) / scale;
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let range_ratio = (max - min) / scale;
        let median_shift = (stats::median(&values) - mean) / scale;
        features.push(std_ratio);
        features.push(range_ratio);
        features.push(median_shift);
    } else {
        features.extend_from_slice(&[0.0, 0.0, 0.0]);
    }

    let confidences: Vec<f64> = run
        .results
        .iter()
        .filter(|r| r.fair_value.is_some())
        .map(|r| r.confidence_base)
        .collect();
    features.push(if confidences.is_empty() { 0.0 } else { stats::mean(&confidences) });

    features.extend_from_slice(recent_accuracy);

    debug_assert_eq!(features.len(), FEATURE_COUNT);
    features
}

/// Per-model accuracy over a trailing window of scored predictions: mean of
/// `1 - min(1, abs error)` per model, with a neutral default where a model
/// has no history.
pub fn recent_accuracy(
    pairs: &[valuation_core::types::ScoredPrediction],
) -> [f64; MODEL_COUNT] {
    const NEUTRAL: f64 = 0.85;

    let mut sums = [0.0; MODEL_COUNT];
    let mut counts = [0usize; MODEL_COUNT];
    for pair in pairs {
        for (index, error) in pair.outcome.model_errors.iter().enumerate() {
            if let Some(e) = error {
                sums[index] += 1.0 - e.abs().min(1.0);
                counts[index] += 1;
            }
        }
    }

    let mut accuracy = [NEUTRAL; MODEL_COUNT];
    for index in 0..MODEL_COUNT {
        if counts[index] > 0 {
            accuracy[index] = sums[index] / counts[index] as f64;
        }
    }
    accuracy
}
