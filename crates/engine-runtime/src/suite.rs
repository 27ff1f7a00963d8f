//! The logical invocation surface of the engine.
//!
//! One facade owning the component engines, the registry and the stores;
//! callers (the HTTP layer, the scheduler) only ever talk to this.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use ensemble_engine::{EnsembleEngine, EnsembleProviders};
use prediction_ledger::OutcomeReconciler;
use ratio_engine::RatioEngine;
use sensitivity_engine::{
    Distribution, MonteCarloStats, OneWayReport, SensitivityAnalyzer, SensitivityParams,
    TornadoBar, TwoWayReport, Variable,
};
use stock_scorer::{
    forest::TrainingPair, rank_scored, DimensionWeightLearner, IndustryBenchmarks, RiskInputs,
    Scorer, DEFAULT_DIMENSION_WEIGHTS,
};
use trend_engine::{SeriesFrequency, TrendAnalyzer};
use valuation_core::error::{EngineError, EngineResult};
use valuation_core::stats;
use valuation_core::types::*;
use weight_trainer::{IndustryTrainer, IndustryTrainingSummary, TrainOutcome, TrainScope, WeightTrainer};

use crate::config::EngineConfig;
use crate::registry::EngineRegistry;

pub struct AnalysisSuite {
    config: EngineConfig,
    registry: Arc<EngineRegistry>,
    providers: EnsembleProviders,
    engine: Arc<EnsembleEngine>,
    trainer: Arc<WeightTrainer>,
    industry_trainer: Arc<IndustryTrainer>,
    sensitivity: SensitivityAnalyzer,
    ratio_engine: RatioEngine,
    trend_analyzer: TrendAnalyzer,
    scorer: Scorer,
    reconciler: OutcomeReconciler,
}

impl AnalysisSuite {
    pub fn new(
        config: EngineConfig,
        registry: Arc<EngineRegistry>,
        providers: EnsembleProviders,
        trainer: WeightTrainer,
        industry_trainer: IndustryTrainer,
    ) -> Self {
        let engine = Arc::new(EnsembleEngine::new(providers.clone()));
        let reconciler =
            OutcomeReconciler::new(providers.predictions.clone(), providers.market.clone());
        Self {
            config,
            registry,
            providers,
            engine,
            trainer: Arc::new(trainer),
            industry_trainer: Arc::new(industry_trainer),
            sensitivity: SensitivityAnalyzer::new(),
            ratio_engine: RatioEngine::new(),
            trend_analyzer: TrendAnalyzer::new(),
            scorer: Scorer::new(),
            reconciler,
        }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<EnsembleEngine> {
        &self.engine
    }

    /// Full ensemble valuation under the request deadline. Statement
    /// staleness is annotated, never silently ignored.
    pub async fn value(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        as_of: NaiveDate,
        options: Option<ValuationOptions>,
    ) -> EngineResult<EnsembleResult> {
        let options = options.unwrap_or(ValuationOptions {
            horizon_days: self.config.default_horizon_days,
            ..Default::default()
        });

        let valuation = self.engine.value(tenant_id, company_id, as_of, &options);
        let mut result = tokio::time::timeout(self.config.request_deadline(), valuation)
            .await
            .map_err(|_| {
                EngineError::DeadlineExceeded(format!(
                    "valuation for {company_id} exceeded {}s",
                    self.config.request_deadline_secs
                ))
            })??;

        if let Ok(statements) = self.providers.statements.statements(company_id, as_of).await {
            if let Some(income) = statements.income {
                let age = as_of.signed_duration_since(income.period_end).num_days();
                if age > self.config.stale_statement_days {
                    result.reasons.push("stale_inputs".to_string());
                    if result.status == ResultStatus::Ok {
                        result.status = ResultStatus::Degraded;
                    }
                }
            }
        }

        Ok(result)
    }

    /// Composite fundamental score for one company.
    pub async fn rate(
        &self,
        company_id: Uuid,
        as_of: NaiveDate,
    ) -> EngineResult<CompositeScore> {
        let company = self.providers.companies.company(company_id).await?;
        let statements = self.providers.statements.statements(company_id, as_of).await?;
        let market = self.providers.market.snapshot(company_id, as_of).await?;

        let ratios = self.ratio_engine.compute(as_of, &statements, &market);
        let benchmarks = self.industry_benchmarks(&company.industry).await?;
        let risk = RiskInputs {
            beta: market.beta,
            volatility_pct: annualised_volatility_pct(&market.closes),
        };

        let (weights, source, ml_confidence) = match self.registry.dimension_weights() {
            Some(learned) => (
                learned.weights,
                ScoreWeightSource::Ml,
                Some(learned.ml_confidence),
            ),
            None => (DEFAULT_DIMENSION_WEIGHTS, ScoreWeightSource::Default, None),
        };

        Ok(self.scorer.composite(
            as_of,
            &ratios,
            &benchmarks,
            &risk,
            weights,
            source,
            ml_confidence,
        ))
    }

    /// Rank companies in scope by composite score, descending, stable
    /// ticker tie-break. Companies that cannot be scored are skipped.
    pub async fn rank(
        &self,
        tenant_id: Uuid,
        as_of: NaiveDate,
        min_score: Option<f64>,
    ) -> EngineResult<Vec<(String, CompositeScore)>> {
        let companies = self.providers.companies.all_companies(tenant_id).await?;
        let mut entries = Vec::with_capacity(companies.len());
        for company in companies {
            match self.rate(company.id, as_of).await {
                Ok(score) => entries.push((company.ticker.clone(), score)),
                Err(e) => {
                    tracing::warn!(ticker = %company.ticker, "skipping in ranking: {e}");
                }
            }
        }
        Ok(rank_scored(entries, min_score))
    }

    /// Trend metrics for one statement metric (quarterly cadence).
    pub async fn trend(
        &self,
        company_id: Uuid,
        metric: &str,
    ) -> EngineResult<TrendMetrics> {
        let values = self
            .providers
            .statements
            .metric_history(company_id, metric, 16)
            .await?;
        self.trend_analyzer
            .analyze(metric, &values, SeriesFrequency::Quarterly)
    }

    // --- Sensitivity -----------------------------------------------------

    pub fn sensitivity_one_way(
        &self,
        base: &SensitivityParams,
        variable: Variable,
        range: (f64, f64),
        n_points: usize,
    ) -> OneWayReport {
        self.sensitivity.one_way(base, variable, range, n_points)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sensitivity_two_way(
        &self,
        base: &SensitivityParams,
        variable_x: Variable,
        variable_y: Variable,
        range_x: (f64, f64),
        range_y: (f64, f64),
        nx: usize,
        ny: usize,
    ) -> TwoWayReport {
        self.sensitivity
            .two_way(base, variable_x, variable_y, range_x, range_y, nx, ny)
    }

    pub fn sensitivity_tornado(
        &self,
        base: &SensitivityParams,
        variables: &[Variable],
        pct: f64,
    ) -> Vec<TornadoBar> {
        self.sensitivity.tornado(base, variables, pct)
    }

    pub fn sensitivity_monte_carlo(
        &self,
        base: &SensitivityParams,
        distributions: &[(Variable, Distribution)],
        simulations: usize,
        seed: u64,
    ) -> MonteCarloStats {
        self.sensitivity.monte_carlo(base, distributions, simulations, seed)
    }

    // --- Training --------------------------------------------------------

    /// Run the daily trainer for a scope under its lock and deadline, and
    /// refresh the weight cache on deployment.
    pub async fn train_scope(
        &self,
        tenant_id: Uuid,
        scope: TrainScope,
    ) -> EngineResult<TrainOutcome> {
        let lock_key = match &scope {
            TrainScope::Global => "train:global".to_string(),
            TrainScope::Industry(name) => format!("train:industry:{name}"),
        };
        let _guard = self.registry.scoped_lock(&lock_key).await;

        let outcome = tokio::time::timeout(
            self.config.training_deadline(),
            self.trainer.train_scope(tenant_id, &scope),
        )
        .await
        .map_err(|_| {
            EngineError::DeadlineExceeded(format!(
                "training for {lock_key} exceeded {}s",
                self.config.training_deadline_secs
            ))
        })??;

        if let TrainOutcome::Deployed(vector) = &outcome {
            self.registry.cache_weights(vector.clone());
        }
        Ok(outcome)
    }

    /// Refit the fallback weighting network on the tenant's scored history
    /// and swap the snapshot into the engine. Returns false when the window
    /// is too thin, leaving the previous snapshot (or the default table) in
    /// force.
    pub async fn refresh_weight_network(&self, tenant_id: Uuid) -> EngineResult<bool> {
        match self.trainer.train_network(tenant_id).await? {
            Some(net) => {
                self.engine.swap_network(Arc::new(net));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Daily per-industry pass: deep industries train, thin ones fill by
    /// transfer or the meta-learner.
    pub async fn train_industries(
        &self,
        tenant_id: Uuid,
    ) -> EngineResult<IndustryTrainingSummary> {
        let _guard = self.registry.scoped_lock("train:industries").await;
        self.industry_trainer.train_all_industries(tenant_id).await
    }

    /// Weekly industry maintenance: rebuild profiles and the meta-learner,
    /// then run the per-industry pipeline with transfer/meta gap-fill.
    pub async fn refresh_industry_profiles(
        &self,
        tenant_id: Uuid,
    ) -> EngineResult<IndustryTrainingSummary> {
        let _guard = self.registry.scoped_lock("train:industries").await;
        self.industry_trainer.refresh_profiles(tenant_id).await?;
        self.industry_trainer.train_all_industries(tenant_id).await
    }

    /// Attach outcomes to every prediction past its horizon.
    pub async fn reconcile_outcomes(&self, until: DateTime<Utc>) -> EngineResult<usize> {
        self.reconciler.reconcile(until).await
    }

    /// Retrain the dimension-weight forest and publish the importances when
    /// the sample set clears the minimum.
    pub fn train_dimension_weights(&self, pairs: &[TrainingPair], seed: u64) -> bool {
        match DimensionWeightLearner::new(seed).train(pairs) {
            Some(learned) => {
                tracing::info!(
                    r2 = learned.r2,
                    confidence = learned.ml_confidence,
                    "published learned dimension weights"
                );
                self.registry.publish_dimension_weights(learned);
                true
            }
            None => false,
        }
    }

    async fn industry_benchmarks(&self, industry: &str) -> EngineResult<IndustryBenchmarks> {
        let stats_provider = &self.providers.industry_stats;
        Ok(IndustryBenchmarks {
            pe_median: stats_provider.median(industry, "pe_ratio").await?,
            pb_median: stats_provider.median(industry, "pb_ratio").await?,
            peg_median: stats_provider.median(industry, "peg_ratio").await?,
            ev_ebitda_median: stats_provider.median(industry, "ev_to_ebitda").await?,
            roe_p90: stats_provider.median(industry, "roe_p90").await?,
            roa_p90: stats_provider.median(industry, "roa_p90").await?,
            net_margin_p90: stats_provider.median(industry, "net_margin_p90").await?,
            operating_margin_p90: stats_provider
                .median(industry, "operating_margin_p90")
                .await?,
        })
    }
}

/// Annualised close-to-close volatility in percent, from a daily close
/// series.
pub fn annualised_volatility_pct(closes: &[f64]) -> Option<f64> {
    if closes.len() < 20 {
        return None;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 10 {
        return None;
    }
    Some(stats::std_dev(&returns) * (252.0f64).sqrt() * 100.0)
}

/// Convenience: upside of a fair value against the current price.
pub fn upside(fair_value: &rust_decimal::Decimal, price: &rust_decimal::Decimal) -> Option<f64> {
    let fv = fair_value.to_f64()?;
    let p = price.to_f64()?;
    if p <= 0.0 {
        return None;
    }
    Some(fv / p - 1.0)
}
