use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use ensemble_engine::features::FEATURE_COUNT;
use ensemble_engine::WeightNet;
use valuation_core::error::EngineResult;
use valuation_core::stats;
use valuation_core::stats::ml_confidence;
use valuation_core::traits::{PredictionRepository, WeightRepository};
use valuation_core::types::{
    DeploymentState, ScoredPrediction, WeightMetrics, WeightOwner, WeightSource, WeightVector,
    DEFAULT_MODEL_WEIGHTS, MODEL_COUNT,
};

/// Scope a training run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainScope {
    Global,
    Industry(String),
}

impl TrainScope {
    pub fn owner(&self) -> WeightOwner {
        match self {
            TrainScope::Global => WeightOwner::global(),
            TrainScope::Industry(name) => WeightOwner::industry(name),
        }
    }

    pub fn industry(&self) -> Option<&str> {
        match self {
            TrainScope::Global => None,
            TrainScope::Industry(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub window_days: i64,
    pub min_samples_global: usize,
    pub min_samples_industry: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub folds: usize,
    pub holdout_fraction: f64,
    pub smoothing_alpha: f64,
    pub significance_level: f64,
    /// Abort when cv_std exceeds this fraction of the cv mean.
    pub cv_std_limit_ratio: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            window_days: 180,
            min_samples_global: 100,
            min_samples_industry: 30,
            epochs: 300,
            learning_rate: 0.05,
            folds: 5,
            holdout_fraction: 0.2,
            smoothing_alpha: 0.3,
            significance_level: 0.05,
            cv_std_limit_ratio: 0.2,
        }
    }
}

/// Result of one scoped training run.
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    /// Candidate passed the gate; the smoothed vector is now active.
    Deployed(WeightVector),
    /// Candidate kept for inspection; prior active vector unchanged.
    Rejected { candidate: WeightVector, reason: String },
    /// Not enough prediction/outcome pairs in the window.
    Skipped { samples: usize, required: usize },
}

/// One training unit: per-model values and the realised price.
#[derive(Debug, Clone)]
struct TrainingSample {
    model_values: [f64; MODEL_COUNT],
    present: [bool; MODEL_COUNT],
    actual: f64,
}

pub struct WeightTrainer {
    weights: Arc<dyn WeightRepository>,
    predictions: Arc<dyn PredictionRepository>,
    config: TrainerConfig,
}

impl WeightTrainer {
    pub fn new(
        weights: Arc<dyn WeightRepository>,
        predictions: Arc<dyn PredictionRepository>,
        config: TrainerConfig,
    ) -> Self {
        Self { weights, predictions, config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Run the daily training pipeline for one (tenant, scope).
    ///
    /// Deterministic for a fixed input state: samples are sorted, descent
    /// starts from the active weights, and no randomness enters the loop.
    /// Deployment must happen under the caller-held per-scope lock.
    pub async fn train_scope(
        &self,
        tenant_id: Uuid,
        scope: &TrainScope,
    ) -> EngineResult<TrainOutcome> {
        let required = match scope {
            TrainScope::Global => self.config.min_samples_global,
            TrainScope::Industry(_) => self.config.min_samples_industry,
        };

        let mut pairs = self
            .predictions
            .window(tenant_id, scope.industry(), self.config.window_days)
            .await?;
        pairs.sort_by(|a, b| {
            a.prediction
                .issued_at
                .cmp(&b.prediction.issued_at)
                .then(a.prediction.id.cmp(&b.prediction.id))
        });

        let samples = to_samples(&pairs);
        if samples.len() < required {
            tracing::info!(
                scope = ?scope,
                samples = samples.len(),
                required,
                "skipping training: insufficient window"
            );
            return Ok(TrainOutcome::Skipped { samples: samples.len(), required });
        }

        let owner = scope.owner();
        let active = match self.weights.active_for(&owner).await? {
            Some(vector) => vector,
            None => {
                // Seed the scope with the default table so the gate has a
                // baseline to beat.
                let default = WeightVector::default_vector(owner.clone(), Utc::now());
                self.weights.activate(&owner, &default, Utc::now()).await?;
                default
            }
        };

        // Chronological holdout for the backtest.
        let holdout_len =
            ((samples.len() as f64) * self.config.holdout_fraction).round() as usize;
        let holdout_len = holdout_len.clamp(1, samples.len() - 1);
        let (train_set, holdout) = samples.split_at(samples.len() - holdout_len);

        // Candidate by projected gradient descent from the active weights.
        let candidate_weights = fit_weights(
            train_set,
            &active.weights,
            self.config.epochs,
            self.config.learning_rate,
        );
        let train_mape = ensemble_mape(train_set, &candidate_weights).unwrap_or(1.0);

        // K-fold cross-validation over the training set.
        let cv_mapes = self.cross_validate(train_set, &active.weights);
        let cv_mean = stats::mean(&cv_mapes);
        let cv_std = stats::std_dev(&cv_mapes);

        let backtest_mape = ensemble_mape(holdout, &candidate_weights).unwrap_or(1.0);
        let r2 = holdout_r2(holdout, &candidate_weights);
        let required_for_full_confidence = (required as f64 * 1.5).ceil() as usize;
        let ml_confidence =
            ml_confidence(r2, cv_std, samples.len(), required_for_full_confidence);

        let mut candidate = WeightVector {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            effective_from: Utc::now(),
            effective_to: None,
            weights: candidate_weights,
            source: WeightSource::Trained,
            metrics: WeightMetrics {
                train_mape,
                backtest_mape,
                cv_std,
                sample_count: samples.len(),
                ml_confidence,
            },
            deployed: DeploymentState::Candidate,
            rejection_reason: None,
        };

        if cv_mean > 0.0 && cv_std > self.config.cv_std_limit_ratio * cv_mean {
            let reason = format!(
                "training_unstable: cv_std {cv_std:.4} above {:.0}% of cv mean {cv_mean:.4}",
                self.config.cv_std_limit_ratio * 100.0
            );
            candidate.rejection_reason = Some(reason.clone());
            self.weights.append(&candidate).await?;
            tracing::warn!(scope = ?scope, %reason, "candidate rejected");
            return Ok(TrainOutcome::Rejected { candidate, reason });
        }

        // A/B gate: paired t-test on per-sample errors over the holdout.
        let candidate_errors = per_sample_errors(holdout, &candidate_weights);
        let active_errors = per_sample_errors(holdout, &active.weights);
        let p_value =
            stats::paired_t_test(&candidate_errors, &active_errors).unwrap_or(1.0);
        let improves = stats::mean(&candidate_errors) < stats::mean(&active_errors);

        if !improves || p_value >= self.config.significance_level {
            let reason = format!(
                "rejected: insufficient improvement (p={p_value:.4}, candidate MAPE {:.4} vs active {:.4})",
                stats::mean(&candidate_errors),
                stats::mean(&active_errors)
            );
            candidate.rejection_reason = Some(reason.clone());
            self.weights.append(&candidate).await?;
            tracing::info!(scope = ?scope, %reason, "active vector retained");
            return Ok(TrainOutcome::Rejected { candidate, reason });
        }

        // Record the winning candidate, then deploy the smoothed vector.
        self.weights.append(&candidate).await?;

        let alpha = self.config.smoothing_alpha;
        let mut smoothed = candidate.clone();
        smoothed.id = Uuid::new_v4();
        smoothed.source = WeightSource::Smoothed;
        for index in 0..MODEL_COUNT {
            smoothed.weights[index] =
                alpha * candidate.weights[index] + (1.0 - alpha) * active.weights[index];
        }
        smoothed.renormalise();
        smoothed.metrics.backtest_mape = ensemble_mape(holdout, &smoothed.weights).unwrap_or(backtest_mape);

        let now = Utc::now();
        self.weights.activate(&owner, &smoothed, now).await?;

        tracing::info!(
            scope = ?scope,
            p_value,
            backtest_mape,
            digest = %digest_weights(&smoothed.weights),
            "deployed smoothed weight vector"
        );
        Ok(TrainOutcome::Deployed(smoothed))
    }

    /// Refit the fallback weighting network on the tenant's scored history.
    ///
    /// Targets are per-sample inverse-error weights (the models that came
    /// closest to the realised price get the mass), features are the
    /// snapshots taken at prediction time. Returns None below the global
    /// sample minimum; the caller swaps the snapshot into the engine.
    pub async fn train_network(&self, tenant_id: Uuid) -> EngineResult<Option<WeightNet>> {
        let mut pairs = self
            .predictions
            .window(tenant_id, None, self.config.window_days)
            .await?;
        pairs.sort_by(|a, b| {
            a.prediction
                .issued_at
                .cmp(&b.prediction.issued_at)
                .then(a.prediction.id.cmp(&b.prediction.id))
        });

        let samples: Vec<(Vec<f64>, [f64; MODEL_COUNT])> = pairs
            .iter()
            .filter(|p| p.prediction.features.len() == FEATURE_COUNT)
            .filter_map(|p| {
                inverse_error_weights(&p.outcome.model_errors)
                    .map(|target| (p.prediction.features.clone(), target))
            })
            .collect();

        if samples.len() < self.config.min_samples_global {
            tracing::info!(
                samples = samples.len(),
                required = self.config.min_samples_global,
                "skipping network refresh: insufficient window"
            );
            return Ok(None);
        }

        let mut net = WeightNet::new_seeded(FEATURE_COUNT, NETWORK_SEED);
        let loss = net.train(&samples, NETWORK_EPOCHS, NETWORK_LEARNING_RATE);
        tracing::info!(samples = samples.len(), loss, "weighting network refreshed");
        Ok(Some(net))
    }

    fn cross_validate(&self, samples: &[TrainingSample], init: &[f64; MODEL_COUNT]) -> Vec<f64> {
        let folds = self.config.folds.max(2);
        let fold_size = (samples.len() / folds).max(1);
        let mut mapes = Vec::with_capacity(folds);

        for fold in 0..folds {
            let start = fold * fold_size;
            let end = if fold == folds - 1 { samples.len() } else { (start + fold_size).min(samples.len()) };
            if start >= end {
                continue;
            }
            let validation = &samples[start..end];
            let train: Vec<TrainingSample> = samples[..start]
                .iter()
                .chain(samples[end..].iter())
                .cloned()
                .collect();
            if train.is_empty() {
                continue;
            }
            let weights = fit_weights(
                &train,
                init,
                self.config.epochs / 2,
                self.config.learning_rate,
            );
            if let Some(mape) = ensemble_mape(validation, &weights) {
                mapes.push(mape);
            }
        }
        mapes
    }
}

const NETWORK_SEED: u64 = 14;
const NETWORK_EPOCHS: usize = 120;
const NETWORK_LEARNING_RATE: f64 = 0.01;

/// Normalised inverse-error weights over the models observed in a sample;
/// None when no model error was recorded.
fn inverse_error_weights(
    model_errors: &[Option<f64>; MODEL_COUNT],
) -> Option<[f64; MODEL_COUNT]> {
    let mut weights = [0.0; MODEL_COUNT];
    let mut total = 0.0;
    for (slot, error) in weights.iter_mut().zip(model_errors.iter()) {
        if let Some(e) = error {
            if e.is_finite() {
                *slot = 1.0 / (e.abs() + 1e-6);
                total += *slot;
            }
        }
    }
    if total <= 0.0 {
        return None;
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    Some(weights)
}

fn to_samples(pairs: &[ScoredPrediction]) -> Vec<TrainingSample> {
    pairs
        .iter()
        .filter_map(|pair| {
            let actual = rust_decimal_to_f64(&pair.outcome.actual_price)?;
            if actual <= 0.0 {
                return None;
            }
            let mut model_values = [0.0; MODEL_COUNT];
            let mut present = [false; MODEL_COUNT];
            let mut present_count = 0usize;
            for (index, value) in pair.prediction.model_values.iter().enumerate() {
                if let Some(v) = value {
                    if v.is_finite() {
                        model_values[index] = *v;
                        present[index] = true;
                        present_count += 1;
                    }
                }
            }
            // A sample with under half the models present says little about
            // the weighting.
            if present_count < MODEL_COUNT / 2 {
                return None;
            }
            Some(TrainingSample { model_values, present, actual })
        })
        .collect()
}

fn rust_decimal_to_f64(d: &rust_decimal::Decimal) -> Option<f64> {
    rust_decimal::prelude::ToPrimitive::to_f64(d)
}

/// Ensemble prediction for one sample, renormalising the weights over the
/// models present in that sample.
fn predict(sample: &TrainingSample, weights: &[f64; MODEL_COUNT]) -> Option<f64> {
    let mut weight_sum = 0.0;
    let mut value = 0.0;
    for index in 0..MODEL_COUNT {
        if sample.present[index] {
            weight_sum += weights[index];
            value += weights[index] * sample.model_values[index];
        }
    }
    if weight_sum <= 0.0 {
        return None;
    }
    Some(value / weight_sum)
}

fn per_sample_errors(samples: &[TrainingSample], weights: &[f64; MODEL_COUNT]) -> Vec<f64> {
    samples
        .iter()
        .filter_map(|s| predict(s, weights).map(|p| ((p - s.actual) / s.actual).abs()))
        .collect()
}

fn ensemble_mape(samples: &[TrainingSample], weights: &[f64; MODEL_COUNT]) -> Option<f64> {
    let errors = per_sample_errors(samples, weights);
    if errors.is_empty() {
        None
    } else {
        Some(stats::mean(&errors))
    }
}

/// Pseudo-R² of the weighted ensemble on the holdout.
fn holdout_r2(samples: &[TrainingSample], weights: &[f64; MODEL_COUNT]) -> f64 {
    let pairs: Vec<(f64, f64)> = samples
        .iter()
        .filter_map(|s| predict(s, weights).map(|p| (p, s.actual)))
        .collect();
    if pairs.len() < 3 {
        return 0.0;
    }
    let actuals: Vec<f64> = pairs.iter().map(|(_, a)| *a).collect();
    let mean_actual = stats::mean(&actuals);
    let ss_tot: f64 = actuals.iter().map(|a| (a - mean_actual).powi(2)).sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    let ss_res: f64 = pairs.iter().map(|(p, a)| (a - p).powi(2)).sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

/// Projected gradient descent on the weight simplex minimising MAPE.
fn fit_weights(
    samples: &[TrainingSample],
    init: &[f64; MODEL_COUNT],
    epochs: usize,
    learning_rate: f64,
) -> [f64; MODEL_COUNT] {
    let mut weights = *init;
    if weights.iter().sum::<f64>() <= 0.0 {
        weights = DEFAULT_MODEL_WEIGHTS;
    }

    for _ in 0..epochs {
        let mut gradient = [0.0; MODEL_COUNT];
        let mut counted = 0usize;

        for sample in samples {
            let weight_sum: f64 = (0..MODEL_COUNT)
                .filter(|i| sample.present[*i])
                .map(|i| weights[i])
                .sum();
            if weight_sum <= 0.0 {
                continue;
            }
            let predicted: f64 = (0..MODEL_COUNT)
                .filter(|i| sample.present[*i])
                .map(|i| weights[i] * sample.model_values[i])
                .sum::<f64>()
                / weight_sum;
            let sign = (predicted - sample.actual).signum();
            for index in 0..MODEL_COUNT {
                if sample.present[index] {
                    // d(predicted)/d(w_i) with the renormalising denominator.
                    let partial = (sample.model_values[index] - predicted) / weight_sum;
                    gradient[index] += sign * partial / sample.actual.abs();
                }
            }
            counted += 1;
        }

        if counted == 0 {
            break;
        }
        for index in 0..MODEL_COUNT {
            weights[index] -= learning_rate * gradient[index] / counted as f64;
            if weights[index] < 0.0 {
                weights[index] = 0.0;
            }
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            weights = DEFAULT_MODEL_WEIGHTS;
        } else {
            for w in weights.iter_mut() {
                *w /= sum;
            }
        }
    }

    weights
}

pub(crate) fn digest_weights(weights: &[f64; MODEL_COUNT]) -> String {
    let serialized = serde_json::to_string(weights).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use valuation_core::memory::{InMemoryPredictionRepository, InMemoryWeightRepository};
    use valuation_core::types::{PredictionOutcome, PredictionRecord};

    fn sample(values: [f64; MODEL_COUNT], actual: f64) -> TrainingSample {
        TrainingSample { model_values: values, present: [true; MODEL_COUNT], actual }
    }

    #[test]
    fn test_fit_weights_stays_on_simplex() {
        let samples: Vec<TrainingSample> = (0..50)
            .map(|i| {
                let actual = 100.0 + (i % 7) as f64;
                sample(
                    [
                        actual + 1.0,
                        actual - 20.0,
                        actual + 15.0,
                        actual - 8.0,
                        actual + 30.0,
                        actual - 30.0,
                        actual + 4.0,
                        actual - 2.0,
                    ],
                    actual,
                )
            })
            .collect();
        let weights = fit_weights(&samples, &DEFAULT_MODEL_WEIGHTS, 200, 0.05);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(weights.iter().all(|w| *w >= 0.0));
    }

    #[test]
    fn test_fit_weights_favours_accurate_model() {
        // Model 0 always nails the price; model 4 is wildly off.
        let samples: Vec<TrainingSample> = (0..80)
            .map(|i| {
                let actual = 100.0 + (i % 11) as f64;
                sample(
                    [
                        actual,
                        actual * 1.2,
                        actual * 0.8,
                        actual * 1.3,
                        actual * 2.0,
                        actual * 0.5,
                        actual * 1.1,
                        actual * 0.9,
                    ],
                    actual,
                )
            })
            .collect();
        let weights = fit_weights(&samples, &DEFAULT_MODEL_WEIGHTS, 400, 0.05);
        let best = weights[0];
        assert!(
            best > weights[4],
            "accurate model should out-weigh the noisy one: {weights:?}"
        );
    }

    #[test]
    fn test_ml_confidence_penalties() {
        let full = ml_confidence(0.8, 0.0, 200, 150);
        assert!((full - 0.8).abs() < 1e-9);
        let penalised = ml_confidence(0.8, 1.0, 200, 150);
        assert!((penalised - 0.6).abs() < 1e-9, "penalty caps at 0.2");
        let thin = ml_confidence(0.8, 0.0, 75, 150);
        assert!((thin - 0.4).abs() < 1e-9, "thin samples halve confidence");
    }

    async fn seed_pairs(
        repo: &InMemoryPredictionRepository,
        tenant: Uuid,
        count: usize,
        candidate_no_better: bool,
    ) {
        for i in 0..count {
            let actual = 100.0 + (i % 13) as f64;
            // When `candidate_no_better`, every model carries the same
            // error, so no reweighting can improve the ensemble.
            // A little deterministic per-sample wobble so error differences
            // have variance for the paired test.
            let wobble = 1.0 + ((i % 5) as f64 - 2.0) * 0.01;
            let model_values: [Option<f64>; MODEL_COUNT] = if candidate_no_better {
                [Some(actual * 1.10 * wobble); MODEL_COUNT]
            } else {
                [
                    Some(actual * 1.01 * wobble),
                    Some(actual * 1.25 * wobble),
                    Some(actual * 0.75 / wobble),
                    Some(actual * 1.30 * wobble),
                    Some(actual * 1.80 * wobble),
                    Some(actual * 0.55 / wobble),
                    Some(actual * 1.15 * wobble),
                    Some(actual * 0.85 / wobble),
                ]
            };
            let prediction = PredictionRecord {
                id: Uuid::new_v4(),
                tenant_id: tenant,
                company_id: Uuid::new_v4(),
                industry: "Steel".into(),
                issued_at: Utc::now() - Duration::days(120) + Duration::hours(i as i64),
                horizon_days: 90,
                fair_value: Decimal::from_f64(actual * 1.1).unwrap(),
                confidence: 0.7,
                model_values,
                features: vec![0.5; 20],
                weights_digest: "seed".into(),
            };
            repo.record(&prediction).await.unwrap();
            repo.record_outcome(&PredictionOutcome {
                prediction_id: prediction.id,
                observed_at: Utc::now(),
                actual_price: Decimal::from_f64(actual).unwrap(),
                abs_pct_error: 0.1,
                model_errors: [Some(0.1); MODEL_COUNT],
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_gate_rejects_candidate_with_identical_errors() {
        let weights = Arc::new(InMemoryWeightRepository::new());
        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let tenant = Uuid::new_v4();
        seed_pairs(&predictions, tenant, 200, true).await;

        let trainer = WeightTrainer::new(weights.clone(), predictions, TrainerConfig::default());
        let outcome = trainer.train_scope(tenant, &TrainScope::Global).await.unwrap();

        match outcome {
            TrainOutcome::Rejected { candidate, reason } => {
                assert!(reason.contains("insufficient improvement") || reason.contains("unstable"));
                assert_eq!(candidate.deployed, DeploymentState::Candidate);
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        // Active vector is still the seeded default.
        let active = weights.active_for(&WeightOwner::global()).await.unwrap().unwrap();
        assert_eq!(active.weights, DEFAULT_MODEL_WEIGHTS);
    }

    #[tokio::test]
    async fn test_deployment_applies_smoothing() {
        let weights = Arc::new(InMemoryWeightRepository::new());
        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let tenant = Uuid::new_v4();
        seed_pairs(&predictions, tenant, 240, false).await;

        let trainer =
            WeightTrainer::new(weights.clone(), predictions, TrainerConfig::default());
        let outcome = trainer.train_scope(tenant, &TrainScope::Global).await.unwrap();

        if let TrainOutcome::Deployed(deployed) = outcome {
            assert!(deployed.is_simplex(1e-6));
            assert_eq!(deployed.source, WeightSource::Smoothed);
            // Deployed vector equals renormalise(0.3 candidate + 0.7 active).
            let history = weights.history(&WeightOwner::global(), 10).await.unwrap();
            let candidate = history
                .iter()
                .find(|v| v.deployed == DeploymentState::Candidate)
                .expect("candidate row persisted");
            let mut expected = [0.0; MODEL_COUNT];
            for i in 0..MODEL_COUNT {
                expected[i] = 0.3 * candidate.weights[i] + 0.7 * DEFAULT_MODEL_WEIGHTS[i];
            }
            let sum: f64 = expected.iter().sum();
            for i in 0..MODEL_COUNT {
                expected[i] /= sum;
                assert!(
                    (deployed.weights[i] - expected[i]).abs() < 1e-9,
                    "smoothing mismatch at {i}"
                );
            }
        }
        // Either outcome, the active vector must be on the simplex.
        let active = weights.active_for(&WeightOwner::global()).await.unwrap().unwrap();
        assert!(active.is_simplex(1e-6));
    }

    #[tokio::test]
    async fn test_training_deterministic() {
        let tenant = Uuid::new_v4();
        let mut digests = Vec::new();
        for _ in 0..2 {
            let weights = Arc::new(InMemoryWeightRepository::new());
            let predictions = Arc::new(InMemoryPredictionRepository::new());
            seed_pairs(&predictions, tenant, 160, false).await;
            let trainer =
                WeightTrainer::new(weights, predictions, TrainerConfig::default());
            let outcome = trainer.train_scope(tenant, &TrainScope::Global).await.unwrap();
            let digest = match outcome {
                TrainOutcome::Deployed(v) => digest_weights(&v.weights),
                TrainOutcome::Rejected { candidate, .. } => digest_weights(&candidate.weights),
                TrainOutcome::Skipped { .. } => panic!("unexpected skip"),
            };
            digests.push(digest);
        }
        assert_eq!(digests[0], digests[1]);
    }

    #[tokio::test]
    async fn test_skip_below_min_samples() {
        let weights = Arc::new(InMemoryWeightRepository::new());
        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let tenant = Uuid::new_v4();
        seed_pairs(&predictions, tenant, 20, false).await;

        let trainer = WeightTrainer::new(weights, predictions, TrainerConfig::default());
        let outcome = trainer.train_scope(tenant, &TrainScope::Global).await.unwrap();
        assert!(matches!(outcome, TrainOutcome::Skipped { required: 100, .. }));
    }
}
