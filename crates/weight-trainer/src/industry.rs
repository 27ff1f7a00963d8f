//! Industry-aware training: per-industry pipelines, similarity transfer for
//! thin industries, and a meta-learner fallback for industries with no
//! similar peer.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use ensemble_engine::WeightNet;
use valuation_core::error::EngineResult;
use valuation_core::stats;
use valuation_core::traits::{
    CompanyProvider, IndustryProfileRepository, PredictionRepository, WeightRepository,
};
use valuation_core::types::{
    DeploymentState, IndustryProfile, ModelId, ScoredPrediction, WeightMetrics, WeightOwner,
    WeightSource, WeightVector, MODEL_COUNT,
};

use crate::trainer::{TrainOutcome, TrainScope, WeightTrainer};

/// Cosine similarity a donor industry must reach for its weights to
/// transfer.
const SIMILARITY_THRESHOLD: f64 = 0.70;
/// Confidence haircut for transferred vectors.
const TRANSFER_CONFIDENCE_FACTOR: f64 = 0.8;
/// Confidence haircut for meta-learner vectors.
const META_CONFIDENCE_FACTOR: f64 = 0.7;
/// Width of the meta-learner's industry descriptor.
pub const META_FEATURE_COUNT: usize = 25;

const META_TRAIN_EPOCHS: usize = 150;
const META_LEARNING_RATE: f64 = 0.01;
const META_SEED: u64 = 20;

/// What happened for each industry in a full training pass.
#[derive(Debug, Default)]
pub struct IndustryTrainingSummary {
    pub trained: Vec<String>,
    pub rejected: Vec<String>,
    pub transferred: Vec<(String, String)>,
    pub meta_filled: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct IndustryTrainer {
    trainer: WeightTrainer,
    companies: Arc<dyn CompanyProvider>,
    predictions: Arc<dyn PredictionRepository>,
    weights: Arc<dyn WeightRepository>,
    profiles: Arc<dyn IndustryProfileRepository>,
    meta: RwLock<Option<Arc<WeightNet>>>,
}

impl IndustryTrainer {
    pub fn new(
        trainer: WeightTrainer,
        companies: Arc<dyn CompanyProvider>,
        predictions: Arc<dyn PredictionRepository>,
        weights: Arc<dyn WeightRepository>,
        profiles: Arc<dyn IndustryProfileRepository>,
    ) -> Self {
        Self {
            trainer,
            companies,
            predictions,
            weights,
            profiles,
            meta: RwLock::new(None),
        }
    }

    /// Current meta-learner snapshot, if a refresh has run.
    pub fn meta_snapshot(&self) -> Option<Arc<WeightNet>> {
        self.meta.read().ok().and_then(|slot| slot.clone())
    }

    /// Train every industry for a tenant: full pipeline where the window is
    /// deep enough, similarity transfer where it is not, meta-learner where
    /// no peer is similar enough. Transfer and meta only fill gaps; they
    /// never replace a trained active vector.
    pub async fn train_all_industries(
        &self,
        tenant_id: Uuid,
    ) -> EngineResult<IndustryTrainingSummary> {
        let mut summary = IndustryTrainingSummary::default();

        let companies = self.companies.all_companies(tenant_id).await?;
        let industries: BTreeSet<String> =
            companies.iter().map(|c| c.industry.clone()).collect();
        let min_samples = self.trainer.config().min_samples_industry;
        let window_days = self.trainer.config().window_days;

        // First pass: industries with a deep enough window train in full,
        // so their vectors exist before any thin industry looks for a donor.
        let mut thin: Vec<String> = Vec::new();
        for industry in industries {
            let pairs = self
                .predictions
                .window(tenant_id, Some(&industry), window_days)
                .await?;

            if pairs.len() >= min_samples {
                let scope = TrainScope::Industry(industry.clone());
                match self.trainer.train_scope(tenant_id, &scope).await? {
                    TrainOutcome::Deployed(_) => summary.trained.push(industry),
                    TrainOutcome::Rejected { .. } => summary.rejected.push(industry),
                    TrainOutcome::Skipped { .. } => summary.skipped.push(industry),
                }
            } else {
                thin.push(industry);
            }
        }

        // Second pass: fill the thin industries, never overwriting a
        // trained vector.
        for industry in thin {
            let owner = WeightOwner::industry(&industry);
            if let Some(active) = self.weights.active_for(&owner).await? {
                if active.source == WeightSource::Trained
                    || active.source == WeightSource::Smoothed
                {
                    summary.skipped.push(industry);
                    continue;
                }
            }

            if let Some((donor, vector)) = self.transfer_from_similar(&industry).await? {
                self.weights.activate(&owner, &vector, Utc::now()).await?;
                summary.transferred.push((industry, donor));
                continue;
            }

            if let Some(vector) = self.meta_weights(&industry).await? {
                self.weights.activate(&owner, &vector, Utc::now()).await?;
                summary.meta_filled.push(industry);
                continue;
            }

            summary.skipped.push(industry);
        }

        tracing::info!(
            trained = summary.trained.len(),
            transferred = summary.transferred.len(),
            meta = summary.meta_filled.len(),
            skipped = summary.skipped.len(),
            "industry training pass complete"
        );
        Ok(summary)
    }

    /// Weekly refresh: rebuild every industry profile from its scored
    /// predictions and retrain the meta-learner on the profiles of
    /// industries that have an active vector.
    pub async fn refresh_profiles(&self, tenant_id: Uuid) -> EngineResult<usize> {
        let companies = self.companies.all_companies(tenant_id).await?;
        let industries: BTreeSet<String> =
            companies.iter().map(|c| c.industry.clone()).collect();
        let window_days = self.trainer.config().window_days;

        let mut training_set: Vec<(Vec<f64>, [f64; MODEL_COUNT])> = Vec::new();
        let mut refreshed = 0usize;

        for industry in industries {
            let pairs = self
                .predictions
                .window(tenant_id, Some(&industry), window_days)
                .await?;
            if pairs.is_empty() {
                continue;
            }

            let profile = build_profile(&industry, &pairs);
            self.profiles.upsert(&profile).await?;
            refreshed += 1;

            let owner = WeightOwner::industry(&industry);
            if let Some(active) = self.weights.active_for(&owner).await? {
                let descriptor = industry_descriptor(&profile, &pairs, &active.weights);
                training_set.push((descriptor, active.weights));
            }
        }

        if training_set.len() >= 3 {
            let mut net = WeightNet::new_seeded(META_FEATURE_COUNT, META_SEED);
            let loss = net.train(&training_set, META_TRAIN_EPOCHS, META_LEARNING_RATE);
            tracing::info!(industries = training_set.len(), loss, "meta-learner refreshed");
            if let Ok(mut slot) = self.meta.write() {
                *slot = Some(Arc::new(net));
            }
        } else {
            tracing::info!(
                industries = training_set.len(),
                "too few trained industries for the meta-learner"
            );
        }

        Ok(refreshed)
    }

    /// Most similar industry by centroid cosine similarity, if above the
    /// threshold and holding an active vector.
    async fn transfer_from_similar(
        &self,
        industry: &str,
    ) -> EngineResult<Option<(String, WeightVector)>> {
        let target = match self.profiles.get(industry).await? {
            Some(profile) => profile,
            None => return Ok(None),
        };

        let mut best: Option<(String, f64)> = None;
        for profile in self.profiles.all().await? {
            if profile.industry == industry {
                continue;
            }
            if let Some(similarity) =
                stats::cosine_similarity(&target.centroid, &profile.centroid)
            {
                if similarity >= SIMILARITY_THRESHOLD
                    && best.as_ref().map_or(true, |(_, s)| similarity > *s)
                {
                    best = Some((profile.industry.clone(), similarity));
                }
            }
        }

        let (donor, similarity) = match best {
            Some(found) => found,
            None => return Ok(None),
        };

        let donor_active = self
            .weights
            .active_for(&WeightOwner::industry(&donor))
            .await?;
        let donor_vector = match donor_active {
            Some(v) => v,
            None => return Ok(None),
        };

        tracing::info!(industry, donor = %donor, similarity, "transferring weights");
        let mut transferred = donor_vector.clone();
        transferred.id = Uuid::new_v4();
        transferred.owner = WeightOwner::industry(industry);
        transferred.source = WeightSource::Transferred;
        transferred.deployed = DeploymentState::Candidate;
        transferred.metrics.ml_confidence =
            donor_vector.metrics.ml_confidence * TRANSFER_CONFIDENCE_FACTOR;
        transferred.rejection_reason = None;
        Ok(Some((donor, transferred)))
    }

    /// Meta-learner weights for an industry with no similar peer.
    async fn meta_weights(&self, industry: &str) -> EngineResult<Option<WeightVector>> {
        let net = match self.meta_snapshot() {
            Some(net) => net,
            None => return Ok(None),
        };
        let profile = match self.profiles.get(industry).await? {
            Some(profile) => profile,
            None => return Ok(None),
        };

        let global_confidence = self
            .weights
            .active_for(&WeightOwner::global())
            .await?
            .map(|v| v.metrics.ml_confidence)
            .unwrap_or(0.5);

        let descriptor = industry_descriptor(&profile, &[], &[0.0; MODEL_COUNT]);
        let weights = net.forward(&descriptor);

        let mut vector = WeightVector {
            id: Uuid::new_v4(),
            owner: WeightOwner::industry(industry),
            effective_from: Utc::now(),
            effective_to: None,
            weights,
            source: WeightSource::Meta,
            metrics: WeightMetrics {
                sample_count: profile.sample_count,
                ml_confidence: global_confidence * META_CONFIDENCE_FACTOR,
                ..Default::default()
            },
            deployed: DeploymentState::Candidate,
            rejection_reason: None,
        };
        vector.renormalise();
        Ok(Some(vector))
    }
}

/// Industry profile from its scored predictions: the feature centroid plus
/// the models ranked by realised error.
fn build_profile(industry: &str, pairs: &[ScoredPrediction]) -> IndustryProfile {
    let feature_len = pairs
        .iter()
        .map(|p| p.prediction.features.len())
        .max()
        .unwrap_or(0);
    let mut centroid = vec![0.0; feature_len];
    for pair in pairs {
        for (index, value) in pair.prediction.features.iter().enumerate() {
            if value.is_finite() {
                centroid[index] += value;
            }
        }
    }
    for value in centroid.iter_mut() {
        *value /= pairs.len() as f64;
    }

    // Rank models by mean absolute error where observed.
    let mut model_errors: Vec<(ModelId, f64)> = Vec::new();
    for model in ModelId::ALL {
        let errors: Vec<f64> = pairs
            .iter()
            .filter_map(|p| p.outcome.model_errors[model.index()])
            .collect();
        if !errors.is_empty() {
            model_errors.push((model, stats::mean(&errors)));
        }
    }
    model_errors.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let best_models = model_errors.iter().take(3).map(|(m, _)| *m).collect();

    IndustryProfile {
        industry: industry.to_string(),
        sample_count: pairs.len(),
        centroid,
        best_models,
        last_trained: Utc::now(),
    }
}

/// The 25-feature meta descriptor: the 20-dim centroid plus normalised
/// sample count, mean absolute error, error dispersion, the top active
/// weight and a price-level volatility proxy.
fn industry_descriptor(
    profile: &IndustryProfile,
    pairs: &[ScoredPrediction],
    active_weights: &[f64; MODEL_COUNT],
) -> Vec<f64> {
    let mut descriptor = vec![0.0; META_FEATURE_COUNT];
    for (index, value) in profile.centroid.iter().take(20).enumerate() {
        descriptor[index] = *value;
    }

    descriptor[20] = (profile.sample_count as f64 / 100.0).min(1.0);

    let errors: Vec<f64> = pairs.iter().map(|p| p.outcome.abs_pct_error).collect();
    descriptor[21] = stats::mean(&errors);
    descriptor[22] = stats::std_dev(&errors);
    descriptor[23] = active_weights.iter().cloned().fold(0.0, f64::max);

    let actuals: Vec<f64> = pairs
        .iter()
        .filter_map(|p| rust_decimal::prelude::ToPrimitive::to_f64(&p.outcome.actual_price))
        .collect();
    let mean_actual = stats::mean(&actuals);
    descriptor[24] = if mean_actual.abs() > f64::EPSILON {
        stats::std_dev(&actuals) / mean_actual.abs()
    } else {
        0.0
    };

    descriptor
}
