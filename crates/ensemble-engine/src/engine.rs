use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use ratio_engine::RatioEngine;
use trend_engine::{SeriesFrequency, TrendAnalyzer};
use valuation_core::error::{EngineError, EngineResult};
use valuation_core::stats;
use valuation_core::traits::*;
use valuation_core::types::*;
use valuation_models::{ModelInputs, ScenarioExecutor, ScenarioRun};

use crate::features::{build_features, recent_accuracy};
use crate::net::WeightNet;

/// External collaborators and core-owned stores the engine reads.
#[derive(Clone)]
pub struct EnsembleProviders {
    pub companies: Arc<dyn CompanyProvider>,
    pub statements: Arc<dyn StatementProvider>,
    pub market: Arc<dyn MarketDataProvider>,
    pub industry_stats: Arc<dyn IndustryStatsProvider>,
    pub macros: Arc<dyn MacroProvider>,
    pub weights: Arc<dyn WeightRepository>,
    pub predictions: Arc<dyn PredictionRepository>,
}

/// Base-scenario confidence multiplier used to renormalise the blended
/// confidence.
const BASE_SCENARIO_CONFIDENCE: f64 = 0.85;

pub struct EnsembleEngine {
    providers: EnsembleProviders,
    ratio_engine: RatioEngine,
    trend_analyzer: TrendAnalyzer,
    executor: ScenarioExecutor,
    /// Trained network snapshot; replaced wholesale, never mutated.
    network: RwLock<Option<Arc<WeightNet>>>,
}

impl EnsembleEngine {
    pub fn new(providers: EnsembleProviders) -> Self {
        Self {
            providers,
            ratio_engine: RatioEngine::new(),
            trend_analyzer: TrendAnalyzer::new(),
            executor: ScenarioExecutor::new(),
            network: RwLock::new(None),
        }
    }

    /// Swap in a freshly-trained network snapshot.
    pub fn swap_network(&self, net: Arc<WeightNet>) {
        if let Ok(mut slot) = self.network.write() {
            *slot = Some(net);
        }
    }

    fn network_snapshot(&self) -> Option<Arc<WeightNet>> {
        self.network.read().ok().and_then(|slot| slot.clone())
    }

    /// Run the full ensemble valuation for one company.
    pub async fn value(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        as_of: NaiveDate,
        options: &ValuationOptions,
    ) -> EngineResult<EnsembleResult> {
        let company = self.providers.companies.company(company_id).await?;

        let statements = match self.providers.statements.statements(company_id, as_of).await {
            Ok(s) => s,
            Err(e) => return Ok(failed_result(company_id, as_of, vec![e.reason_code().into()])),
        };
        let market = match self.providers.market.snapshot(company_id, as_of).await {
            Ok(m) => m,
            Err(e) => return Ok(failed_result(company_id, as_of, vec![e.reason_code().into()])),
        };

        // Step 1: ratios and trend.
        let ratios = self.ratio_engine.compute(as_of, &statements, &market);

        let trend_direction = if options.include_trend {
            self.revenue_trend(company_id).await
        } else {
            TrendDirection::Stable
        };

        // Step 2: the 24 scenario results.
        let inputs = self
            .assemble_inputs(&company, &statements, &market, &ratios, as_of)
            .await?;
        let run = self.executor.run(company_id, as_of, &inputs);

        // Step 3: feature vector and weight resolution.
        let window = self
            .providers
            .predictions
            .window(tenant_id, Some(company.industry.as_str()), 90)
            .await
            .unwrap_or_default();
        let accuracy = recent_accuracy(&window);
        let features = build_features(&run, &accuracy);
        let model_weights = self.resolve_weights(&company, &features).await?;

        // Step 4: scenario weights from the trend.
        let scenario_weights = scenario_weights_for(trend_direction);

        // Steps 5-8: blend, final value, range, recommendation.
        let blended = blend_models(&run, &scenario_weights);
        let mut reasons: Vec<String> = Vec::new();
        let degraded_metrics: Vec<String> = ModelId::ALL
            .iter()
            .filter(|m| blended.values[m.index()].is_none())
            .map(|m| m.as_str().to_string())
            .collect();

        for result in &run.results {
            if let Some(reason) = result.diagnostics.get("reason").and_then(|r| r.as_str()) {
                let tagged = format!("{}/{}: {}", result.model_id.as_str(), result.scenario.as_str(), reason);
                if !reasons.contains(&tagged) {
                    reasons.push(tagged);
                }
            }
        }

        let usable: Vec<usize> = (0..MODEL_COUNT)
            .filter(|i| blended.values[*i].is_some())
            .collect();
        if usable.is_empty() {
            let mut result = failed_result(company_id, as_of, reasons);
            result.degraded_metrics = degraded_metrics;
            result.per_model_values = run.results;
            result.scenario_weights = scenario_weights;
            return Ok(result);
        }

        // Renormalise the model weights over the models that produced finite
        // values.
        let mut weights = model_weights;
        let usable_sum: f64 = usable.iter().map(|i| weights[*i]).sum();
        if usable_sum > 0.0 {
            for (index, weight) in weights.iter_mut().enumerate() {
                if blended.values[index].is_some() {
                    *weight /= usable_sum;
                } else {
                    *weight = 0.0;
                }
            }
        } else {
            let share = 1.0 / usable.len() as f64;
            for (index, weight) in weights.iter_mut().enumerate() {
                *weight = if blended.values[index].is_some() { share } else { 0.0 };
            }
        }

        let final_value: f64 = usable
            .iter()
            .map(|i| weights[*i] * blended.values[*i].unwrap_or(0.0))
            .sum();
        // The scenario multipliers all sit below 1, so the weighted blend is
        // renormalised against the base-case multiplier; otherwise every
        // fully-populated valuation would read as low-confidence.
        let confidence: f64 = (usable
            .iter()
            .map(|i| weights[*i] * blended.confidences[*i])
            .sum::<f64>()
            / BASE_SCENARIO_CONFIDENCE)
            .clamp(0.0, 1.0);

        let (range_low, range_high) = value_range(&run, &weights, &scenario_weights, final_value);

        let current_price = market.close_price.and_then(|d| d.to_f64());
        let recommendation = current_price
            .filter(|p| *p > 0.0)
            .map(|price| recommend(final_value / price - 1.0, confidence));

        let status = if degraded_metrics.is_empty() && reasons.is_empty() {
            ResultStatus::Ok
        } else {
            ResultStatus::Degraded
        };

        let final_decimal = Decimal::from_f64(final_value)
            .map(|d| d.round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven));

        // Step 9: record the prediction for the feedback loop.
        let weights_digest = digest_weights(&weights);
        let prediction_id = if let Some(fair_value) = final_decimal {
            let prediction = PredictionRecord {
                id: Uuid::new_v4(),
                tenant_id,
                company_id,
                industry: company.industry.clone(),
                issued_at: Utc::now(),
                horizon_days: options.horizon_days,
                fair_value,
                confidence,
                model_values: blended.values,
                features: features.clone(),
                weights_digest: weights_digest.clone(),
            };
            match self.providers.predictions.record(&prediction).await {
                Ok(()) => Some(prediction.id),
                Err(e) => {
                    tracing::warn!("failed to record prediction: {e}");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            company = %company.ticker,
            fair_value = final_value,
            confidence,
            status = status.as_str(),
            "ensemble valuation complete"
        );

        Ok(EnsembleResult {
            company_id,
            as_of,
            final_fair_value: final_decimal,
            confidence,
            value_range: (range_low, range_high),
            model_weights: weights,
            scenario_weights,
            per_model_values: run.results,
            recommendation,
            status,
            degraded_metrics,
            reasons,
            prediction_id,
        })
    }

    /// Revenue trend direction from quarterly history; Stable when the
    /// series is too short.
    async fn revenue_trend(&self, company_id: Uuid) -> TrendDirection {
        match self
            .providers
            .statements
            .metric_history(company_id, "revenue", 12)
            .await
        {
            Ok(values) => self
                .trend_analyzer
                .analyze("revenue", &values, SeriesFrequency::Quarterly)
                .map(|t| t.direction)
                .unwrap_or(TrendDirection::Stable),
            Err(_) => TrendDirection::Stable,
        }
    }

    /// Weight-vector precedence: company override > industry active >
    /// global active > trained network > default table.
    async fn resolve_weights(
        &self,
        company: &CompanyInfo,
        features: &[f64],
    ) -> EngineResult<[f64; MODEL_COUNT]> {
        let owners = [
            WeightOwner::company(company.id),
            WeightOwner::industry(&company.industry),
            WeightOwner::global(),
        ];
        for owner in owners {
            if let Some(vector) = self.providers.weights.active_for(&owner).await? {
                if !vector.is_simplex(1e-6) {
                    return Err(EngineError::InvariantViolation(format!(
                        "active vector for {} off the simplex",
                        owner.cache_key()
                    )));
                }
                return Ok(vector.weights);
            }
        }
        if let Some(net) = self.network_snapshot() {
            return Ok(net.forward(features));
        }
        Ok(DEFAULT_MODEL_WEIGHTS)
    }

    /// Build the base model inputs from the snapshot.
    async fn assemble_inputs(
        &self,
        company: &CompanyInfo,
        statements: &StatementSet,
        market: &MarketSnapshot,
        ratios: &RatioSet,
        as_of: NaiveDate,
    ) -> EngineResult<ModelInputs> {
        let d2f = |d: Option<Decimal>| d.and_then(|v| v.to_f64());

        let income = statements.income.as_ref();
        let balance = statements.balance.as_ref();
        let cash_flow = statements.cash_flow.as_ref();

        let shares = d2f(market.shares_outstanding)
            .or_else(|| company.shares_outstanding.to_f64())
            .unwrap_or(0.0);

        let risk_free = self.providers.macros.risk_free_rate(as_of).await.unwrap_or(0.045);
        let premium = self
            .providers
            .macros
            .equity_risk_premium(as_of)
            .await
            .unwrap_or(0.055);
        let default_tax = self
            .providers
            .macros
            .effective_tax_rate(as_of)
            .await
            .unwrap_or(0.21);
        let tax_rate = ratios.effective_tax_rate.unwrap_or(default_tax);

        let cost_of_equity = risk_free + premium;

        let total_debt = balance.and_then(|b| {
            match (d2f(b.long_term_debt), d2f(b.short_term_debt)) {
                (None, None) => None,
                (l, s) => Some(l.unwrap_or(0.0) + s.unwrap_or(0.0)),
            }
        });

        // Cost of debt from interest expense over total debt, with a floor.
        let cost_of_debt = match (income.and_then(|i| d2f(i.interest_expense)), total_debt) {
            (Some(interest), Some(debt)) if debt > 0.0 => (interest.abs() / debt).max(0.01),
            _ => 0.08,
        };

        // Market-value-weighted WACC.
        let equity_value = d2f(market.market_cap)
            .or_else(|| balance.and_then(|b| d2f(b.total_equity)))
            .unwrap_or(0.0);
        let debt_value = total_debt.unwrap_or(0.0);
        let total_capital = equity_value + debt_value;
        let wacc = if total_capital > 0.0 {
            (equity_value / total_capital) * cost_of_equity
                + (debt_value / total_capital) * cost_of_debt * (1.0 - tax_rate)
        } else {
            cost_of_equity
        };

        let net_debt = total_debt.map(|debt| {
            debt - balance
                .and_then(|b| d2f(b.cash_and_equivalents))
                .unwrap_or(0.0)
        });

        let invested_capital = balance.and_then(|b| {
            d2f(b.total_equity).map(|eq| eq + total_debt.unwrap_or(0.0))
        });

        let free_cash_flow = cash_flow.and_then(|cf| {
            d2f(cf.free_cash_flow).or_else(|| {
                match (d2f(cf.operating_cash_flow), d2f(cf.capital_expenditures)) {
                    (Some(ocf), Some(capex)) => Some(ocf + capex),
                    _ => None,
                }
            })
        });

        // Declining growth schedule anchored on observed revenue growth.
        let headline_growth = ratios
            .revenue_growth_yoy
            .unwrap_or(0.05)
            .clamp(-0.05, 0.25);
        let growth_schedule: Vec<f64> =
            (0..5).map(|year| headline_growth * 0.9f64.powi(year)).collect();
        let lynch_growth = ratios
            .eps_growth_yoy
            .or(ratios.revenue_growth_yoy)
            .unwrap_or(0.05)
            .clamp(0.0, 0.30);

        let industry_ps = self
            .providers
            .industry_stats
            .median(&company.industry, "ps_ratio")
            .await?;
        let industry_pcf = self
            .providers
            .industry_stats
            .median(&company.industry, "pcf_ratio")
            .await?;

        let inputs = ModelInputs {
            shares_outstanding: shares,
            current_price: d2f(market.close_price),
            eps: ratios.eps,
            revenue: income.and_then(|i| d2f(i.revenue)),
            net_income: income.and_then(|i| d2f(i.net_income)),
            operating_income: income.and_then(|i| d2f(i.operating_income)),
            book_value: balance.and_then(|b| d2f(b.total_equity)),
            book_value_per_share: ratios.book_value_per_share,
            current_assets: balance.and_then(|b| d2f(b.current_assets)),
            total_liabilities: balance.and_then(|b| d2f(b.total_liabilities)),
            total_debt,
            net_debt,
            invested_capital,
            free_cash_flow,
            operating_cash_flow: cash_flow.and_then(|cf| d2f(cf.operating_cash_flow)),
            wacc,
            cost_of_equity,
            terminal_growth: 0.025,
            tax_rate,
            growth_schedule,
            growth_rate: lynch_growth,
            dividend_yield: ratios.dividend_yield.unwrap_or(0.0),
            industry_ps,
            industry_pcf,
            projection_years: 5,
            data_completeness: 1.0,
        };
        Ok(inputs.with_measured_completeness())
    }
}

/// Scenario weights from the trend direction, linearly interpolated between
/// the strong-improving, stable and strong-declining anchors.
pub fn scenario_weights_for(direction: TrendDirection) -> [f64; SCENARIO_COUNT] {
    let s = direction.score();
    let (bull, base) = if s >= 0.0 {
        (0.25 + 0.20 * s, 0.50 - 0.10 * s)
    } else {
        (0.25 + 0.10 * s, 0.50 + 0.10 * s)
    };
    let bear = 1.0 - bull - base;
    [bull, base, bear]
}

struct BlendedModels {
    values: [Option<f64>; MODEL_COUNT],
    confidences: [f64; MODEL_COUNT],
}

/// Scenario-blend each model's values and confidences. A model with no
/// finite scenario value is excluded (None).
fn blend_models(run: &ScenarioRun, scenario_weights: &[f64; SCENARIO_COUNT]) -> BlendedModels {
    let mut values = [None; MODEL_COUNT];
    let mut confidences = [0.0; MODEL_COUNT];

    for (index, model) in ModelId::ALL.iter().enumerate() {
        let per_scenario = run.model_values(*model);
        let mut value_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut confidence_sum = 0.0;

        for scenario in Scenario::ALL {
            let s = scenario.index();
            if let Some(v) = per_scenario[s] {
                if v.is_finite() {
                    value_sum += scenario_weights[s] * v;
                    weight_sum += scenario_weights[s];
                    let confidence = run
                        .results
                        .iter()
                        .find(|r| r.model_id == *model && r.scenario == scenario)
                        .map(|r| r.confidence_base)
                        .unwrap_or(0.0);
                    confidence_sum += scenario_weights[s] * confidence;
                }
            }
        }

        if weight_sum > 0.0 {
            values[index] = Some(value_sum / weight_sum);
            confidences[index] = confidence_sum / weight_sum;
        }
    }

    BlendedModels { values, confidences }
}

/// Weighted P10/P90 of the 24 values, widened if needed so the final value
/// sits inside the band.
fn value_range(
    run: &ScenarioRun,
    model_weights: &[f64; MODEL_COUNT],
    scenario_weights: &[f64; SCENARIO_COUNT],
    final_value: f64,
) -> (Decimal, Decimal) {
    let pairs: Vec<(f64, f64)> = run
        .results
        .iter()
        .filter_map(|r| {
            let value = r.fair_value.and_then(|d| d.to_f64())?;
            let weight =
                model_weights[r.model_id.index()] * scenario_weights[r.scenario.index()];
            Some((value, weight))
        })
        .collect();

    let mut low = stats::weighted_percentile(&pairs, 10.0);
    let mut high = stats::weighted_percentile(&pairs, 90.0);
    low = low.min(final_value);
    high = high.max(final_value);

    let to_dec = |v: f64| {
        Decimal::from_f64(v)
            .map(|d| d.round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven))
            .unwrap_or_default()
    };
    (to_dec(low), to_dec(high))
}

/// Recommendation ladder over upside and confidence.
fn recommend(upside: f64, confidence: f64) -> Recommendation {
    if upside > 0.20 && confidence > 0.6 {
        Recommendation::StrongBuy
    } else if upside > 0.10 {
        Recommendation::Buy
    } else if upside > -0.10 {
        Recommendation::Hold
    } else if upside > -0.20 {
        Recommendation::Sell
    } else {
        Recommendation::StrongSell
    }
}

fn digest_weights(weights: &[f64; MODEL_COUNT]) -> String {
    let serialized = serde_json::to_string(weights).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

fn failed_result(company_id: Uuid, as_of: NaiveDate, reasons: Vec<String>) -> EnsembleResult {
    EnsembleResult {
        company_id,
        as_of,
        final_fair_value: None,
        confidence: 0.0,
        value_range: (Decimal::ZERO, Decimal::ZERO),
        model_weights: [0.0; MODEL_COUNT],
        scenario_weights: scenario_weights_for(TrendDirection::Stable),
        per_model_values: Vec::new(),
        recommendation: None,
        status: ResultStatus::Failed,
        degraded_metrics: Vec::new(),
        reasons,
        prediction_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_weights_anchors() {
        let strong_up = scenario_weights_for(TrendDirection::StrongImproving);
        assert!((strong_up[0] - 0.45).abs() < 1e-9);
        assert!((strong_up[1] - 0.40).abs() < 1e-9);
        assert!((strong_up[2] - 0.15).abs() < 1e-9);

        let stable = scenario_weights_for(TrendDirection::Stable);
        assert!((stable[0] - 0.25).abs() < 1e-9);
        assert!((stable[1] - 0.50).abs() < 1e-9);
        assert!((stable[2] - 0.25).abs() < 1e-9);

        let strong_down = scenario_weights_for(TrendDirection::StrongDeclining);
        assert!((strong_down[0] - 0.15).abs() < 1e-9);
        assert!((strong_down[1] - 0.40).abs() < 1e-9);
        assert!((strong_down[2] - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_weights_always_simplex() {
        for direction in [
            TrendDirection::StrongImproving,
            TrendDirection::Improving,
            TrendDirection::Stable,
            TrendDirection::Declining,
            TrendDirection::StrongDeclining,
        ] {
            let w = scenario_weights_for(direction);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(w.iter().all(|x| *x > 0.0));
        }
    }

    #[test]
    fn test_recommendation_ladder() {
        assert_eq!(recommend(0.25, 0.7), Recommendation::StrongBuy);
        assert_eq!(recommend(0.25, 0.5), Recommendation::Buy);
        assert_eq!(recommend(0.15, 0.3), Recommendation::Buy);
        assert_eq!(recommend(0.0, 0.9), Recommendation::Hold);
        assert_eq!(recommend(-0.15, 0.9), Recommendation::Sell);
        assert_eq!(recommend(-0.30, 0.9), Recommendation::StrongSell);
    }
}
