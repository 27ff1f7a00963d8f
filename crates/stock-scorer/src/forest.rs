//! Dimension-weight learner.
//!
//! A compact random-forest regressor fit on (dimension scores -> forward
//! return) pairs. The normalised feature importances become the published
//! dimension weights; confidence comes from the shared trained-artifact
//! formula. Seeded bootstrap keeps retraining reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use valuation_core::stats;

/// Number of scoring dimensions (the feature width).
pub const DIMENSIONS: usize = 5;

/// Minimum training pairs before learned weights replace the defaults.
pub const MIN_TRAINING_SAMPLES: usize = 100;

const N_TREES: usize = 60;
const MAX_DEPTH: usize = 5;
const MIN_LEAF: usize = 5;
const CV_FOLDS: usize = 5;

/// One training pair: the five dimension scores and the realised forward
/// return over the scoring horizon.
pub type TrainingPair = ([f64; DIMENSIONS], f64);

/// Learned dimension weights with training metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedDimensionWeights {
    pub weights: [f64; DIMENSIONS],
    pub r2: f64,
    pub cv_std: f64,
    pub sample_count: usize,
    pub ml_confidence: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        prediction: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        /// Variance reduction achieved by this split, weighted by the
        /// number of samples reaching it.
        gain: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, features: &[f64; DIMENSIONS]) -> f64 {
        match self {
            Node::Leaf { prediction } => *prediction,
            Node::Split { feature, threshold, left, right, .. } => {
                if features[*feature] <= *threshold {
                    left.predict(features)
                } else {
                    right.predict(features)
                }
            }
        }
    }

    fn accumulate_importance(&self, importances: &mut [f64; DIMENSIONS]) {
        if let Node::Split { feature, gain, left, right, .. } = self {
            importances[*feature] += gain;
            left.accumulate_importance(importances);
            right.accumulate_importance(importances);
        }
    }
}

struct Forest {
    trees: Vec<Node>,
}

impl Forest {
    fn predict(&self, features: &[f64; DIMENSIONS]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }

    fn importances(&self) -> [f64; DIMENSIONS] {
        let mut importances = [0.0; DIMENSIONS];
        for tree in &self.trees {
            tree.accumulate_importance(&mut importances);
        }
        importances
    }
}

pub struct DimensionWeightLearner {
    seed: u64,
}

impl DimensionWeightLearner {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Fit the forest and publish normalised importances. Returns None when
    /// the sample set is below the minimum, leaving the defaults in force.
    pub fn train(&self, pairs: &[TrainingPair]) -> Option<LearnedDimensionWeights> {
        if pairs.len() < MIN_TRAINING_SAMPLES {
            return None;
        }

        let forest = fit_forest(pairs, self.seed);

        // Training fit.
        let predictions: Vec<f64> = pairs.iter().map(|(x, _)| forest.predict(x)).collect();
        let actuals: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
        let r2 = r_squared(&predictions, &actuals);

        // K-fold error dispersion for the confidence penalty.
        let cv_errors = cross_validated_errors(pairs, self.seed);
        let cv_std = stats::std_dev(&cv_errors);

        let raw = forest.importances();
        let total: f64 = raw.iter().sum();
        let weights = if total > 0.0 {
            let mut w = [0.0; DIMENSIONS];
            for i in 0..DIMENSIONS {
                w[i] = raw[i] / total;
            }
            w
        } else {
            // Degenerate target: nothing to learn from.
            return None;
        };

        let ml_confidence = stats::ml_confidence(
            r2,
            cv_std,
            pairs.len(),
            MIN_TRAINING_SAMPLES * 3 / 2,
        );

        Some(LearnedDimensionWeights {
            weights,
            r2,
            cv_std,
            sample_count: pairs.len(),
            ml_confidence,
        })
    }
}

fn fit_forest(pairs: &[TrainingPair], seed: u64) -> Forest {
    let mut rng = StdRng::seed_from_u64(seed);
    let trees = (0..N_TREES)
        .map(|_| {
            // Bootstrap sample with replacement.
            let sample: Vec<TrainingPair> = (0..pairs.len())
                .map(|_| pairs[rng.gen_range(0..pairs.len())])
                .collect();
            build_tree(&sample, 0)
        })
        .collect();
    Forest { trees }
}

fn build_tree(sample: &[TrainingPair], depth: usize) -> Node {
    let targets: Vec<f64> = sample.iter().map(|(_, y)| *y).collect();
    let prediction = stats::mean(&targets);

    if depth >= MAX_DEPTH || sample.len() < 2 * MIN_LEAF {
        return Node::Leaf { prediction };
    }

    let parent_variance = variance(&targets);
    if parent_variance <= f64::EPSILON {
        return Node::Leaf { prediction };
    }

    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, gain)
    for feature in 0..DIMENSIONS {
        let mut values: Vec<f64> = sample.iter().map(|(x, _)| x[feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        // Candidate thresholds at the midpoints of consecutive values.
        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<TrainingPair>, Vec<TrainingPair>) =
                sample.iter().copied().partition(|(x, _)| x[feature] <= threshold);
            if left.len() < MIN_LEAF || right.len() < MIN_LEAF {
                continue;
            }
            let left_targets: Vec<f64> = left.iter().map(|(_, y)| *y).collect();
            let right_targets: Vec<f64> = right.iter().map(|(_, y)| *y).collect();
            let weighted_child = (left_targets.len() as f64 * variance(&left_targets)
                + right_targets.len() as f64 * variance(&right_targets))
                / sample.len() as f64;
            let gain = (parent_variance - weighted_child) * sample.len() as f64;
            if gain > best.map_or(0.0, |(_, _, g)| g) {
                best = Some((feature, threshold, gain));
            }
        }
    }

    match best {
        Some((feature, threshold, gain)) => {
            let (left, right): (Vec<TrainingPair>, Vec<TrainingPair>) =
                sample.iter().copied().partition(|(x, _)| x[feature] <= threshold);
            Node::Split {
                feature,
                threshold,
                gain,
                left: Box::new(build_tree(&left, depth + 1)),
                right: Box::new(build_tree(&right, depth + 1)),
            }
        }
        None => Node::Leaf { prediction },
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = stats::mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn r_squared(predictions: &[f64], actuals: &[f64]) -> f64 {
    let mean_actual = stats::mean(actuals);
    let ss_tot: f64 = actuals.iter().map(|a| (a - mean_actual).powi(2)).sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(actuals.iter())
        .map(|(p, a)| (a - p).powi(2))
        .sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

fn cross_validated_errors(pairs: &[TrainingPair], seed: u64) -> Vec<f64> {
    let fold_size = (pairs.len() / CV_FOLDS).max(1);
    let mut errors = Vec::with_capacity(CV_FOLDS);

    for fold in 0..CV_FOLDS {
        let start = fold * fold_size;
        let end = if fold == CV_FOLDS - 1 { pairs.len() } else { (start + fold_size).min(pairs.len()) };
        if start >= end {
            continue;
        }
        let validation = &pairs[start..end];
        let train: Vec<TrainingPair> = pairs[..start]
            .iter()
            .chain(pairs[end..].iter())
            .copied()
            .collect();
        if train.len() < 2 * MIN_LEAF {
            continue;
        }
        let forest = fit_forest(&train, seed.wrapping_add(fold as u64 + 1));
        let mae = validation
            .iter()
            .map(|(x, y)| (forest.predict(x) - y).abs())
            .sum::<f64>()
            / validation.len() as f64;
        errors.push(mae);
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic pairs where the forward return is driven almost entirely
    /// by the first dimension.
    fn driven_by_valuation(n: usize) -> Vec<TrainingPair> {
        (0..n)
            .map(|i| {
                let valuation = (i % 20) as f64 * 5.0;
                let noise = ((i * 7) % 11) as f64 * 0.001;
                let features = [
                    valuation,
                    ((i * 3) % 17) as f64 * 2.0,
                    ((i * 5) % 13) as f64 * 3.0,
                    ((i * 11) % 7) as f64 * 4.0,
                    ((i * 13) % 5) as f64 * 6.0,
                ];
                (features, valuation * 0.01 + noise)
            })
            .collect()
    }

    #[test]
    fn test_below_minimum_returns_none() {
        let learner = DimensionWeightLearner::new(42);
        assert!(learner.train(&driven_by_valuation(50)).is_none());
    }

    #[test]
    fn test_learns_the_driving_dimension() {
        let learner = DimensionWeightLearner::new(42);
        let learned = learner.train(&driven_by_valuation(300)).unwrap();
        let sum: f64 = learned.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let top = learned
            .weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(top, 0, "valuation drives the target: {:?}", learned.weights);
        assert!(learned.r2 > 0.5);
        assert!(learned.ml_confidence > 0.0);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let pairs = driven_by_valuation(200);
        let a = DimensionWeightLearner::new(7).train(&pairs).unwrap();
        let b = DimensionWeightLearner::new(7).train(&pairs).unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.r2.to_bits(), b.r2.to_bits());
    }

    #[test]
    fn test_flat_target_yields_none() {
        let pairs: Vec<TrainingPair> =
            (0..150).map(|i| ([i as f64, 1.0, 2.0, 3.0, 4.0], 0.5)).collect();
        let learner = DimensionWeightLearner::new(42);
        assert!(learner.train(&pairs).is_none());
    }
}
