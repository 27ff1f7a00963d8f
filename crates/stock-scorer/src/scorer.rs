use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use valuation_core::stats::logistic_score;
use valuation_core::types::{
    CompositeScore, Dimension, DimensionScore, RatioSet, Rating, ScoreWeightSource,
};

/// Default dimension weights used until the learner publishes its own.
pub const DEFAULT_DIMENSION_WEIGHTS: [f64; 5] = [0.25, 0.20, 0.20, 0.20, 0.15];

/// Industry context for relative scoring. Any missing median falls back to
/// the absolute benchmark bands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndustryBenchmarks {
    pub pe_median: Option<f64>,
    pub pb_median: Option<f64>,
    pub peg_median: Option<f64>,
    pub ev_ebitda_median: Option<f64>,
    /// 90th-percentile caps for the profitability inputs.
    pub roe_p90: Option<f64>,
    pub roa_p90: Option<f64>,
    pub net_margin_p90: Option<f64>,
    pub operating_margin_p90: Option<f64>,
}

/// Market-derived risk inputs the ratio set does not carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskInputs {
    pub beta: Option<f64>,
    /// Annualised volatility in percent.
    pub volatility_pct: Option<f64>,
}

pub struct Scorer;

impl Scorer {
    pub fn new() -> Self {
        Self
    }

    /// Full composite score with the given dimension weights.
    pub fn composite(
        &self,
        as_of: NaiveDate,
        ratios: &RatioSet,
        benchmarks: &IndustryBenchmarks,
        risk: &RiskInputs,
        dimension_weights: [f64; 5],
        source: ScoreWeightSource,
        ml_confidence: Option<f64>,
    ) -> CompositeScore {
        let scores = [
            self.valuation_score(ratios, benchmarks),
            self.profitability_score(ratios, benchmarks),
            self.growth_score(ratios),
            self.health_score(ratios),
            self.risk_score(ratios, risk),
        ];

        let composite = scores
            .iter()
            .zip(dimension_weights.iter())
            .map(|(s, w)| s.value * w)
            .sum::<f64>()
            .clamp(0.0, 100.0);

        CompositeScore {
            company_id: ratios.company_id,
            as_of,
            composite,
            rating: Rating::from_score(composite),
            dimension_weights,
            dimension_scores: scores.to_vec(),
            source,
            ml_confidence,
        }
    }

    /// Valuation: multiples inverse-scaled against the industry median when
    /// available, absolute bands otherwise. Lower multiples score higher.
    fn valuation_score(&self, ratios: &RatioSet, benchmarks: &IndustryBenchmarks) -> DimensionScore {
        let mut parts: Vec<f64> = Vec::new();
        let mut breakdown = serde_json::Map::new();

        let mut push = |name: &str, score: Option<f64>, parts: &mut Vec<f64>| {
            if let Some(s) = score {
                let s = s.clamp(0.0, 100.0);
                breakdown.insert(name.to_string(), json!((s * 100.0).round() / 100.0));
                parts.push(s);
            }
        };

        push(
            "pe_score",
            score_multiple(ratios.pe_ratio, benchmarks.pe_median, 15.0, 3.33),
            &mut parts,
        );
        push(
            "pb_score",
            score_multiple(ratios.pb_ratio, benchmarks.pb_median, 1.0, 25.0),
            &mut parts,
        );
        push(
            "peg_score",
            score_multiple(ratios.peg_ratio, benchmarks.peg_median, 1.0, 50.0),
            &mut parts,
        );
        push(
            "ev_ebitda_score",
            score_multiple(ratios.ev_to_ebitda, benchmarks.ev_ebitda_median, 8.0, 5.0),
            &mut parts,
        );

        finish(Dimension::Valuation, parts, breakdown)
    }

    /// Profitability: returns and margins, capped at the industry's 90th
    /// percentile where known so one outlier print cannot saturate the
    /// dimension.
    fn profitability_score(
        &self,
        ratios: &RatioSet,
        benchmarks: &IndustryBenchmarks,
    ) -> DimensionScore {
        let mut parts: Vec<f64> = Vec::new();
        let mut breakdown = serde_json::Map::new();

        let mut item = |name: &str,
                        value: Option<f64>,
                        cap: Option<f64>,
                        low: f64,
                        slope: f64,
                        parts: &mut Vec<f64>| {
            if let Some(raw) = value {
                let pct = capped(raw, cap) * 100.0;
                let score = ((pct - low) * slope).clamp(0.0, 100.0);
                breakdown.insert(name.to_string(), json!((score * 100.0).round() / 100.0));
                parts.push(score);
            }
        };

        // ROE > 20% saturates, < 5% floors; ROA 10%/2%; margins likewise.
        item("roe_score", ratios.roe, benchmarks.roe_p90, 5.0, 6.67, &mut parts);
        item("roa_score", ratios.roa, benchmarks.roa_p90, 2.0, 12.5, &mut parts);
        item(
            "net_margin_score",
            ratios.net_margin,
            benchmarks.net_margin_p90,
            3.0,
            8.33,
            &mut parts,
        );
        item(
            "operating_margin_score",
            ratios.operating_margin,
            benchmarks.operating_margin_p90,
            5.0,
            6.67,
            &mut parts,
        );

        finish(Dimension::Profitability, parts, breakdown)
    }

    /// Growth: signed growth rates through a logistic ramp, so modest
    /// positive growth scores well above 50 and contraction decays to 0.
    fn growth_score(&self, ratios: &RatioSet) -> DimensionScore {
        let mut parts: Vec<f64> = Vec::new();
        let mut breakdown = serde_json::Map::new();

        let mut item = |name: &str, value: Option<f64>, midpoint: f64, parts: &mut Vec<f64>| {
            if let Some(rate) = value {
                let score = logistic_score(rate, midpoint, 15.0);
                breakdown.insert(name.to_string(), json!((score * 100.0).round() / 100.0));
                parts.push(score);
            }
        };

        item("revenue_growth_score", ratios.revenue_growth_yoy, 0.10, &mut parts);
        item("earnings_growth_score", ratios.net_income_growth_yoy, 0.12, &mut parts);
        item("book_value_growth_score", ratios.total_assets_growth_yoy, 0.07, &mut parts);

        finish(Dimension::Growth, parts, breakdown)
    }

    /// Financial health: liquidity up, leverage down, coverage up.
    fn health_score(&self, ratios: &RatioSet) -> DimensionScore {
        let mut parts: Vec<f64> = Vec::new();
        let mut breakdown = serde_json::Map::new();

        if let Some(cr) = ratios.current_ratio {
            let score = if cr >= 2.0 {
                100.0
            } else if cr >= 1.0 {
                50.0 + (cr - 1.0) * 50.0
            } else {
                (cr * 62.5).max(0.0)
            };
            breakdown.insert("current_ratio_score".into(), json!(score));
            parts.push(score.clamp(0.0, 100.0));
        }

        if let Some(qr) = ratios.quick_ratio {
            let score = if qr >= 1.5 {
                100.0
            } else if qr >= 1.0 {
                75.0 + (qr - 1.0) * 50.0
            } else {
                (qr * 71.43).max(0.0)
            };
            breakdown.insert("quick_ratio_score".into(), json!(score));
            parts.push(score.clamp(0.0, 100.0));
        }

        if let Some(de) = ratios.debt_to_equity {
            let score = (100.0 - de * 33.33).clamp(0.0, 100.0);
            breakdown.insert("debt_to_equity_score".into(), json!(score));
            parts.push(score);
        }

        if let Some(ic) = ratios.interest_coverage {
            let score = if ic >= 10.0 {
                100.0
            } else if ic >= 2.0 {
                50.0 + (ic - 2.0) * 6.25
            } else {
                (ic * 25.0).max(0.0)
            };
            breakdown.insert("interest_coverage_score".into(), json!(score));
            parts.push(score.clamp(0.0, 100.0));
        }

        finish(Dimension::Health, parts, breakdown)
    }

    /// Risk: Altman Z mapped linearly between the distress and safe zones,
    /// beta and volatility inverted. Higher score means lower risk.
    fn risk_score(&self, ratios: &RatioSet, risk: &RiskInputs) -> DimensionScore {
        let mut parts: Vec<f64> = Vec::new();
        let mut breakdown = serde_json::Map::new();

        if let Some(z) = ratios.altman_z_score {
            let score = if z >= 3.0 {
                100.0
            } else if z < 1.81 {
                0.0
            } else {
                (z - 1.81) / (3.0 - 1.81) * 100.0
            };
            breakdown.insert("altman_z_score".into(), json!(score));
            parts.push(score);
        }

        if let Some(beta) = risk.beta {
            let score = (100.0 - (beta - 0.8).abs() * 50.0).clamp(0.0, 100.0);
            breakdown.insert("beta_score".into(), json!(score));
            parts.push(score);
        }

        if let Some(vol) = risk.volatility_pct {
            let score = (100.0 - (vol - 15.0) * 5.0).clamp(0.0, 100.0);
            breakdown.insert("volatility_score".into(), json!(score));
            parts.push(score);
        }

        // With nothing observable, sit in the middle rather than flattering
        // or punishing the name.
        if parts.is_empty() {
            parts.push(50.0);
        }

        finish(Dimension::Risk, parts, breakdown)
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rank scored companies descending, stable tie-break by ticker.
pub fn rank_scored(
    mut entries: Vec<(String, CompositeScore)>,
    min_score: Option<f64>,
) -> Vec<(String, CompositeScore)> {
    if let Some(min) = min_score {
        entries.retain(|(_, score)| score.composite >= min);
    }
    entries.sort_by(|a, b| {
        b.1.composite
            .partial_cmp(&a.1.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries
}

fn capped(value: f64, cap: Option<f64>) -> f64 {
    match cap {
        Some(c) => value.min(c),
        None => value,
    }
}

/// Inverse multiple scoring. With an industry median, the multiple is
/// rescaled so the median sits where the absolute anchor does; without one,
/// the absolute band applies directly: `100 - (multiple - anchor) * slope`.
fn score_multiple(
    multiple: Option<f64>,
    median: Option<f64>,
    anchor: f64,
    slope: f64,
) -> Option<f64> {
    let m = multiple?;
    if m <= 0.0 {
        return None;
    }
    let effective = match median {
        Some(med) if med > 0.0 => m / med * anchor,
        _ => m,
    };
    Some((100.0 - (effective - anchor) * slope).clamp(0.0, 100.0))
}

fn finish(
    dimension: Dimension,
    parts: Vec<f64>,
    breakdown: serde_json::Map<String, serde_json::Value>,
) -> DimensionScore {
    let value = if parts.is_empty() {
        0.0
    } else {
        parts.iter().sum::<f64>() / parts.len() as f64
    };
    DimensionScore {
        dimension,
        value: value.clamp(0.0, 100.0),
        breakdown: serde_json::Value::Object(breakdown),
    }
}
