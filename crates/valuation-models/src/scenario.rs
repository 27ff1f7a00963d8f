//! Bull/Base/Bear execution of the model battery.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use valuation_core::stats;
use valuation_core::types::{ModelId, Scenario, ValuationResult, MODEL_COUNT};

use crate::inputs::ModelInputs;
use crate::models;

/// Parameter perturbation for one scenario.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScenarioAdjustment {
    pub wacc_delta: f64,
    pub growth_delta: f64,
    pub margin_multiplier: f64,
    pub confidence_multiplier: f64,
}

impl ScenarioAdjustment {
    pub fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Bull => Self {
                wacc_delta: -0.02,
                growth_delta: 0.03,
                margin_multiplier: 1.05,
                confidence_multiplier: 0.70,
            },
            Scenario::Base => Self {
                wacc_delta: 0.0,
                growth_delta: 0.0,
                margin_multiplier: 1.0,
                confidence_multiplier: 0.85,
            },
            Scenario::Bear => Self {
                wacc_delta: 0.03,
                growth_delta: -0.02,
                margin_multiplier: 0.95,
                confidence_multiplier: 0.65,
            },
        }
    }
}

/// Whether a model consumes each perturbed parameter. Models that consume
/// none run identically across scenarios.
fn consumes(model: ModelId) -> (bool, bool, bool) {
    // (wacc/discount rate, growth, margins)
    match model {
        ModelId::Dcf => (true, true, true),
        ModelId::Rim => (true, true, true),
        ModelId::Eva => (true, true, true),
        ModelId::Graham => (false, false, false),
        ModelId::PeterLynch => (false, true, false),
        ModelId::Ncav => (false, false, false),
        ModelId::PriceSales => (false, false, false),
        ModelId::PriceCashFlow => (false, false, false),
    }
}

/// Apply a scenario to the base inputs for one model.
fn adjusted_inputs(
    base: &ModelInputs,
    model: ModelId,
    adjustment: &ScenarioAdjustment,
) -> ModelInputs {
    let (uses_wacc, uses_growth, uses_margin) = consumes(model);
    let mut inputs = base.clone();

    if uses_wacc {
        inputs.wacc += adjustment.wacc_delta;
        inputs.cost_of_equity += adjustment.wacc_delta;
    }
    if uses_growth {
        for growth in inputs.growth_schedule.iter_mut() {
            *growth += adjustment.growth_delta;
        }
        inputs.growth_rate += adjustment.growth_delta;
    }
    if uses_margin {
        let m = adjustment.margin_multiplier;
        inputs.net_income = inputs.net_income.map(|v| v * m);
        inputs.operating_income = inputs.operating_income.map(|v| v * m);
        inputs.free_cash_flow = inputs.free_cash_flow.map(|v| v * m);
        inputs.operating_cash_flow = inputs.operating_cash_flow.map(|v| v * m);
        inputs.eps = inputs.eps.map(|v| v * m);
    }

    inputs
}

/// Full scenario battery output: the 24 tagged results plus per-model
/// scenario coherence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub results: Vec<ValuationResult>,
    /// `1 - std/|mean|` over each model's three scenario values; 0 when the
    /// model produced fewer than two finite values.
    pub coherence: [f64; MODEL_COUNT],
    pub inputs_digest: String,
}

impl ScenarioRun {
    /// Finite values of one model across scenarios, scenario-indexed.
    pub fn model_values(&self, model: ModelId) -> [Option<f64>; 3] {
        let mut values = [None; 3];
        for result in &self.results {
            if result.model_id == model {
                values[result.scenario.index()] =
                    result.fair_value.and_then(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d));
            }
        }
        values
    }
}

pub struct ScenarioExecutor;

impl ScenarioExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run every model under every scenario. Pure and deterministic; the
    /// digest ties the 24 results back to the exact inputs.
    pub fn run(
        &self,
        company_id: Uuid,
        as_of: NaiveDate,
        base: &ModelInputs,
    ) -> ScenarioRun {
        let inputs_digest = digest_inputs(base);
        let mut results = Vec::with_capacity(MODEL_COUNT * 3);

        for model in ModelId::ALL {
            for scenario in Scenario::ALL {
                let adjustment = ScenarioAdjustment::for_scenario(scenario);
                let inputs = adjusted_inputs(base, model, &adjustment);
                let estimate = models::estimate(model, &inputs);

                let confidence_base = if estimate.fair_value.is_some() {
                    model.base_confidence()
                        * base.data_completeness
                        * adjustment.confidence_multiplier
                } else {
                    0.0
                };

                let mut diagnostics = estimate.diagnostics;
                if let Some(reason) = &estimate.reason {
                    diagnostics = serde_json::json!({ "reason": reason });
                }

                results.push(ValuationResult {
                    company_id,
                    as_of,
                    model_id: model,
                    scenario,
                    fair_value: estimate.fair_value.and_then(Decimal::from_f64),
                    confidence_base,
                    diagnostics,
                    inputs_digest: inputs_digest.clone(),
                });
            }
        }

        let coherence = coherence_of(&results);
        ScenarioRun { results, coherence, inputs_digest }
    }
}

impl Default for ScenarioExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn coherence_of(results: &[ValuationResult]) -> [f64; MODEL_COUNT] {
    let mut coherence = [0.0; MODEL_COUNT];
    for (index, model) in ModelId::ALL.iter().enumerate() {
        let values: Vec<f64> = results
            .iter()
            .filter(|r| r.model_id == *model)
            .filter_map(|r| r.fair_value)
            .filter_map(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d))
            .collect();
        if values.len() >= 2 {
            let mean = stats::mean(&values);
            if mean.abs() > f64::EPSILON {
                let ratio = stats::std_dev_pop(&values) / mean.abs();
                coherence[index] = (1.0 - ratio).clamp(0.0, 1.0);
            }
        }
    }
    coherence
}

/// Stable digest of the canonical input serialization; reproducible from the
/// referenced statement rows.
pub fn digest_inputs(inputs: &ModelInputs) -> String {
    let serialized = serde_json::to_string(inputs).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}
