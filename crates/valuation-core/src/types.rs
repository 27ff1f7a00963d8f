use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of valuation models in the ensemble.
pub const MODEL_COUNT: usize = 8;

/// Number of scenarios each model runs under.
pub const SCENARIO_COUNT: usize = 3;

/// Company master data. Immutable after creation except cosmetic fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub id: Uuid,
    pub ticker: String,
    pub industry: String,
    pub sector: String,
    pub shares_outstanding: Decimal,
    pub fiscal_year_end: NaiveDate,
}

/// Reporting cadence of a statement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    Annual,
    Quarterly,
}

impl Default for PeriodKind {
    fn default() -> Self {
        PeriodKind::Annual
    }
}

/// Income statement line items. Money in fixed-point decimal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub company_id: Uuid,
    pub period_end: NaiveDate,
    pub period_kind: PeriodKind,
    pub revenue: Option<Decimal>,
    pub cost_of_revenue: Option<Decimal>,
    pub gross_profit: Option<Decimal>,
    pub operating_income: Option<Decimal>,
    pub ebitda: Option<Decimal>,
    pub interest_expense: Option<Decimal>,
    pub income_before_tax: Option<Decimal>,
    pub income_tax_expense: Option<Decimal>,
    pub net_income: Option<Decimal>,
    pub eps: Option<Decimal>,
}

/// Balance sheet line items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub company_id: Uuid,
    pub period_end: NaiveDate,
    pub period_kind: PeriodKind,
    pub current_assets: Option<Decimal>,
    pub total_assets: Option<Decimal>,
    pub cash_and_equivalents: Option<Decimal>,
    pub inventory: Option<Decimal>,
    pub accounts_receivable: Option<Decimal>,
    pub property_plant_equipment: Option<Decimal>,
    pub current_liabilities: Option<Decimal>,
    pub total_liabilities: Option<Decimal>,
    pub accounts_payable: Option<Decimal>,
    pub short_term_debt: Option<Decimal>,
    pub long_term_debt: Option<Decimal>,
    pub total_equity: Option<Decimal>,
    pub retained_earnings: Option<Decimal>,
}

/// Cash flow statement line items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub company_id: Uuid,
    pub period_end: NaiveDate,
    pub period_kind: PeriodKind,
    pub operating_cash_flow: Option<Decimal>,
    pub investing_cash_flow: Option<Decimal>,
    pub financing_cash_flow: Option<Decimal>,
    pub capital_expenditures: Option<Decimal>,
    pub free_cash_flow: Option<Decimal>,
    pub dividends_paid: Option<Decimal>,
}

/// One statement snapshot used by a single valuation request: the latest
/// rows as of the request date plus the prior-period rows for averages and
/// growth. All components observe this one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementSet {
    pub income: Option<IncomeStatement>,
    pub prev_income: Option<IncomeStatement>,
    pub balance: Option<BalanceSheet>,
    pub prev_balance: Option<BalanceSheet>,
    pub cash_flow: Option<CashFlowStatement>,
    pub prev_cash_flow: Option<CashFlowStatement>,
}

/// Daily market bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub company_id: Uuid,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub adjusted_close: Decimal,
    pub volume: f64,
}

/// Market context for one valuation: latest close, market cap, shares, and
/// the trailing close series for volatility/beta/trend work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of: Option<NaiveDate>,
    pub close_price: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub shares_outstanding: Option<Decimal>,
    pub closes: Vec<f64>,
    pub beta: Option<f64>,
}

/// Dense record of ~50 ratios for (company, as_of). All values double
/// precision; undefined ratios are None, never infinity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatioSet {
    pub company_id: Uuid,
    pub as_of: NaiveDate,

    // Liquidity
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub cash_ratio: Option<f64>,
    pub operating_cash_flow_ratio: Option<f64>,
    pub working_capital_ratio: Option<f64>,

    // Profitability
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub ebitda_margin: Option<f64>,
    pub roa: Option<f64>,
    pub roe: Option<f64>,
    pub roic: Option<f64>,
    pub roce: Option<f64>,

    // Leverage
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub equity_multiplier: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub debt_service_coverage: Option<f64>,
    pub net_debt_to_ebitda: Option<f64>,

    // Efficiency
    pub asset_turnover: Option<f64>,
    pub fixed_asset_turnover: Option<f64>,
    pub inventory_turnover: Option<f64>,
    pub receivables_turnover: Option<f64>,
    pub payables_turnover: Option<f64>,
    pub days_sales_outstanding: Option<f64>,
    pub days_inventory_outstanding: Option<f64>,
    pub days_payable_outstanding: Option<f64>,
    pub cash_conversion_cycle: Option<f64>,

    // Market value
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub ev_to_revenue: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub ev_to_ebit: Option<f64>,
    pub price_to_cash_flow: Option<f64>,
    pub price_to_fcf: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub earnings_yield: Option<f64>,
    pub peg_ratio: Option<f64>,

    // Growth (YoY; None when the base period changed sign)
    pub revenue_growth_yoy: Option<f64>,
    pub net_income_growth_yoy: Option<f64>,
    pub eps_growth_yoy: Option<f64>,
    pub ebitda_growth_yoy: Option<f64>,
    pub total_assets_growth_yoy: Option<f64>,

    // Cash flow
    pub operating_cf_margin: Option<f64>,
    pub fcf_margin: Option<f64>,
    pub fcf_to_net_income: Option<f64>,
    pub cash_flow_coverage: Option<f64>,

    // Composite risk inputs
    pub altman_z_score: Option<f64>,
    pub effective_tax_rate: Option<f64>,
    pub eps: Option<f64>,
    pub book_value_per_share: Option<f64>,
}

/// Classified slope of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    StrongImproving,
    Improving,
    Stable,
    Declining,
    StrongDeclining,
}

impl TrendDirection {
    /// Signed strength in [-1, 1] used for scenario-weight interpolation.
    pub fn score(&self) -> f64 {
        match self {
            TrendDirection::StrongImproving => 1.0,
            TrendDirection::Improving => 0.5,
            TrendDirection::Stable => 0.0,
            TrendDirection::Declining => -0.5,
            TrendDirection::StrongDeclining => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::StrongImproving => "strong_improving",
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Declining => "declining",
            TrendDirection::StrongDeclining => "strong_declining",
        }
    }
}

/// Moving-average summary for a series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovingAverages {
    pub sma_3: Option<f64>,
    pub sma_5: Option<f64>,
    pub ema_3: Option<f64>,
    pub ema_5: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub golden_cross: bool,
    pub death_cross: bool,
}

/// Seasonality check via lagged autocorrelation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seasonality {
    pub lag: usize,
    pub autocorrelation: f64,
    pub flagged: bool,
}

/// Trend metrics for one (company, metric, as_of).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendMetrics {
    pub metric: String,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub cagr: Option<f64>,
    pub direction: TrendDirection,
    pub significant: bool,
    pub anomaly_indices: Vec<usize>,
    pub moving_averages: MovingAverages,
    pub seasonality: Option<Seasonality>,
}

/// The eight valuation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    Dcf,
    Rim,
    Eva,
    Graham,
    PeterLynch,
    Ncav,
    PriceSales,
    PriceCashFlow,
}

impl ModelId {
    pub const ALL: [ModelId; MODEL_COUNT] = [
        ModelId::Dcf,
        ModelId::Rim,
        ModelId::Eva,
        ModelId::Graham,
        ModelId::PeterLynch,
        ModelId::Ncav,
        ModelId::PriceSales,
        ModelId::PriceCashFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Dcf => "dcf",
            ModelId::Rim => "rim",
            ModelId::Eva => "eva",
            ModelId::Graham => "graham_number",
            ModelId::PeterLynch => "peter_lynch",
            ModelId::Ncav => "ncav",
            ModelId::PriceSales => "price_sales",
            ModelId::PriceCashFlow => "price_cashflow",
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0)
    }

    /// Intrinsic reliability of the model before data-quality scaling.
    pub fn base_confidence(&self) -> f64 {
        match self {
            ModelId::Dcf => 0.75,
            ModelId::Rim => 0.72,
            ModelId::Eva => 0.70,
            ModelId::Graham => 0.68,
            ModelId::PeterLynch => 0.65,
            ModelId::Ncav => 0.60,
            ModelId::PriceSales => 0.62,
            ModelId::PriceCashFlow => 0.64,
        }
    }
}

/// Scenario under which a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scenario {
    Bull,
    Base,
    Bear,
}

impl Scenario {
    pub const ALL: [Scenario; SCENARIO_COUNT] = [Scenario::Bull, Scenario::Base, Scenario::Bear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Bull => "bull",
            Scenario::Base => "base",
            Scenario::Bear => "bear",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Scenario::Bull => 0,
            Scenario::Base => 1,
            Scenario::Bear => 2,
        }
    }
}

/// One model run under one scenario. Requests always produce 24 of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    pub company_id: Uuid,
    pub as_of: NaiveDate,
    pub model_id: ModelId,
    pub scenario: Scenario,
    pub fair_value: Option<Decimal>,
    pub confidence_base: f64,
    pub diagnostics: serde_json::Value,
    pub inputs_digest: String,
}

/// Granularity at which a weight vector applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Global,
    Industry,
    CompanyOverride,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Global => "global",
            OwnerKind::Industry => "industry",
            OwnerKind::CompanyOverride => "company_override",
        }
    }
}

/// Owner of a weight vector: global, an industry, or a single company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightOwner {
    pub kind: OwnerKind,
    /// Industry name or company id; empty for global.
    pub id: String,
}

impl WeightOwner {
    pub fn global() -> Self {
        Self { kind: OwnerKind::Global, id: String::new() }
    }

    pub fn industry(name: &str) -> Self {
        Self { kind: OwnerKind::Industry, id: name.to_string() }
    }

    pub fn company(id: Uuid) -> Self {
        Self { kind: OwnerKind::CompanyOverride, id: id.to_string() }
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

/// Provenance of a weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightSource {
    Default,
    Trained,
    Transferred,
    Meta,
    Smoothed,
}

impl WeightSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightSource::Default => "default",
            WeightSource::Trained => "trained",
            WeightSource::Transferred => "transferred",
            WeightSource::Meta => "meta",
            WeightSource::Smoothed => "smoothed",
        }
    }
}

/// Deployment state of a weight vector. Transitions are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Candidate,
    Shadow,
    Active,
    Retired,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Candidate => "candidate",
            DeploymentState::Shadow => "shadow",
            DeploymentState::Active => "active",
            DeploymentState::Retired => "retired",
        }
    }
}

/// Training metrics attached to a weight vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightMetrics {
    pub train_mape: f64,
    pub backtest_mape: f64,
    pub cv_std: f64,
    pub sample_count: usize,
    pub ml_confidence: f64,
}

/// Per-owner model weights. At most one Active vector per owner at any
/// instant; weights sum to 1 within 1e-6 and are all non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightVector {
    pub id: Uuid,
    pub owner: WeightOwner,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
    pub weights: [f64; MODEL_COUNT],
    pub source: WeightSource,
    pub metrics: WeightMetrics,
    pub deployed: DeploymentState,
    pub rejection_reason: Option<String>,
}

/// Weight table used when no trained vector applies.
pub const DEFAULT_MODEL_WEIGHTS: [f64; MODEL_COUNT] =
    [0.20, 0.15, 0.15, 0.12, 0.10, 0.08, 0.10, 0.10];

impl WeightVector {
    pub fn default_vector(owner: WeightOwner, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            effective_from: now,
            effective_to: None,
            weights: DEFAULT_MODEL_WEIGHTS,
            source: WeightSource::Default,
            metrics: WeightMetrics::default(),
            deployed: DeploymentState::Active,
            rejection_reason: None,
        }
    }

    /// Whether the weights lie on the simplex within tolerance.
    pub fn is_simplex(&self, eps: f64) -> bool {
        let sum: f64 = self.weights.iter().sum();
        (sum - 1.0).abs() <= eps && self.weights.iter().all(|w| *w >= 0.0)
    }

    /// Renormalise in place so the weights sum to exactly 1.
    pub fn renormalise(&mut self) {
        let sum: f64 = self.weights.iter().sum();
        if sum > 0.0 {
            for w in self.weights.iter_mut() {
                *w /= sum;
            }
        }
    }
}

/// A fair-value call recorded for later scoring against the realised price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub industry: String,
    pub issued_at: DateTime<Utc>,
    pub horizon_days: i64,
    pub fair_value: Decimal,
    pub confidence: f64,
    /// Scenario-blended per-model values snapshotted at issue time, so
    /// training can re-score the ensemble under arbitrary weights.
    pub model_values: [Option<f64>; MODEL_COUNT],
    pub features: Vec<f64>,
    pub weights_digest: String,
}

/// Realised outcome attached to a matured prediction. Exactly one per
/// prediction after a completed reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub prediction_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub actual_price: Decimal,
    pub abs_pct_error: f64,
    pub model_errors: [Option<f64>; MODEL_COUNT],
}

/// A prediction joined with its outcome; the training unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub prediction: PredictionRecord,
    pub outcome: PredictionOutcome,
}

/// Scoring dimensions of the composite fundamental score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Valuation,
    Profitability,
    Growth,
    Health,
    Risk,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Valuation,
        Dimension::Profitability,
        Dimension::Growth,
        Dimension::Health,
        Dimension::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Valuation => "valuation",
            Dimension::Profitability => "profitability",
            Dimension::Growth => "growth",
            Dimension::Health => "health",
            Dimension::Risk => "risk",
        }
    }
}

/// One dimension's score with its sub-metric breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub value: f64,
    pub breakdown: serde_json::Value,
}

/// Letter rating bands over the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    APlus,
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
    F,
}

impl Rating {
    /// Non-decreasing step function of the composite score.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Rating::APlus,
            s if s >= 80.0 => Rating::A,
            s if s >= 70.0 => Rating::BPlus,
            s if s >= 60.0 => Rating::B,
            s if s >= 50.0 => Rating::CPlus,
            s if s >= 40.0 => Rating::C,
            s if s >= 30.0 => Rating::D,
            _ => Rating::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::APlus => "A+",
            Rating::A => "A",
            Rating::BPlus => "B+",
            Rating::B => "B",
            Rating::CPlus => "C+",
            Rating::C => "C",
            Rating::D => "D",
            Rating::F => "F",
        }
    }
}

/// Where the dimension weights came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreWeightSource {
    Default,
    Ml,
}

/// Composite fundamental score with its dimension breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    pub company_id: Uuid,
    pub as_of: NaiveDate,
    pub composite: f64,
    pub rating: Rating,
    pub dimension_weights: [f64; 5],
    pub dimension_scores: Vec<DimensionScore>,
    pub source: ScoreWeightSource,
    pub ml_confidence: Option<f64>,
}

/// Industry centroid and performance summary used for transfer learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryProfile {
    pub industry: String,
    pub sample_count: usize,
    pub centroid: Vec<f64>,
    pub best_models: Vec<ModelId>,
    pub last_trained: DateTime<Utc>,
}

/// Action recommendation from the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Hold => "Hold",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }
}

/// Response status shared by every user-visible result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Ok,
    Degraded,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::Degraded => "degraded",
            ResultStatus::Failed => "failed",
        }
    }
}

/// Final ensemble output for one valuation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub company_id: Uuid,
    pub as_of: NaiveDate,
    pub final_fair_value: Option<Decimal>,
    pub confidence: f64,
    pub value_range: (Decimal, Decimal),
    pub model_weights: [f64; MODEL_COUNT],
    pub scenario_weights: [f64; SCENARIO_COUNT],
    pub per_model_values: Vec<ValuationResult>,
    pub recommendation: Option<Recommendation>,
    pub status: ResultStatus,
    pub degraded_metrics: Vec<String>,
    pub reasons: Vec<String>,
    pub prediction_id: Option<Uuid>,
}

/// Request options for a valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationOptions {
    pub horizon_days: i64,
    pub include_trend: bool,
    /// Seed for any stochastic sub-step; fixed seed plus fixed inputs
    /// reproduces the output byte for byte.
    pub seed: u64,
}

impl Default for ValuationOptions {
    fn default() -> Self {
        Self { horizon_days: 90, include_trend: true, seed: 42 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let sum: f64 = DEFAULT_MODEL_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rating_bands_monotonic() {
        let scores = [95.0, 85.0, 75.0, 65.0, 55.0, 45.0, 35.0, 10.0];
        let expected = [
            Rating::APlus,
            Rating::A,
            Rating::BPlus,
            Rating::B,
            Rating::CPlus,
            Rating::C,
            Rating::D,
            Rating::F,
        ];
        for (s, e) in scores.iter().zip(expected.iter()) {
            assert_eq!(Rating::from_score(*s), *e);
        }
        assert_eq!(Rating::from_score(90.0), Rating::APlus);
        assert_eq!(Rating::from_score(89.999), Rating::A);
    }

    #[test]
    fn test_weight_vector_renormalise() {
        let mut v = WeightVector::default_vector(WeightOwner::global(), Utc::now());
        v.weights = [2.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0];
        v.renormalise();
        assert!(v.is_simplex(1e-9));
        assert!((v.weights[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_model_index_round_trip() {
        for (i, m) in ModelId::ALL.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }
}
