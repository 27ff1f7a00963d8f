use serde::{Deserialize, Serialize};

/// Everything the eight models read. Assembled once per request from the
/// statement snapshot, market data, macro inputs and industry medians; the
/// scenario executor derives perturbed copies from the base.
///
/// Money amounts arrive here as f64 for the numerics; fair values are
/// converted back to fixed-point decimal at the result boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInputs {
    pub shares_outstanding: f64,
    pub current_price: Option<f64>,

    // Income statement
    pub eps: Option<f64>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_income: Option<f64>,

    // Balance sheet
    pub book_value: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub current_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_debt: Option<f64>,
    pub net_debt: Option<f64>,
    pub invested_capital: Option<f64>,

    // Cash flow
    pub free_cash_flow: Option<f64>,
    pub operating_cash_flow: Option<f64>,

    // Rates and growth
    pub wacc: f64,
    pub cost_of_equity: f64,
    pub terminal_growth: f64,
    pub tax_rate: f64,
    /// Per-year growth schedule for the projection horizon.
    pub growth_schedule: Vec<f64>,
    /// Headline growth rate (fraction) for the Lynch fair-P/E rule.
    pub growth_rate: f64,
    pub dividend_yield: f64,

    // Industry medians for the multiple models
    pub industry_ps: Option<f64>,
    pub industry_pcf: Option<f64>,

    pub projection_years: usize,
    /// Fraction of the key inputs that were present, in [0, 1]. Scales every
    /// model's base confidence.
    pub data_completeness: f64,
}

impl Default for ModelInputs {
    fn default() -> Self {
        Self {
            shares_outstanding: 0.0,
            current_price: None,
            eps: None,
            revenue: None,
            net_income: None,
            operating_income: None,
            book_value: None,
            book_value_per_share: None,
            current_assets: None,
            total_liabilities: None,
            total_debt: None,
            net_debt: None,
            invested_capital: None,
            free_cash_flow: None,
            operating_cash_flow: None,
            wacc: 0.09,
            cost_of_equity: 0.10,
            terminal_growth: 0.025,
            tax_rate: 0.21,
            growth_schedule: vec![0.05; 5],
            growth_rate: 0.05,
            dividend_yield: 0.0,
            industry_ps: None,
            industry_pcf: None,
            projection_years: 5,
            data_completeness: 1.0,
        }
    }
}

impl ModelInputs {
    /// Recompute `data_completeness` from the presence of the inputs the
    /// models actually consume.
    pub fn with_measured_completeness(mut self) -> Self {
        let fields = [
            self.eps.is_some(),
            self.revenue.is_some(),
            self.net_income.is_some(),
            self.operating_income.is_some(),
            self.book_value.is_some(),
            self.book_value_per_share.is_some(),
            self.current_assets.is_some(),
            self.total_liabilities.is_some(),
            self.net_debt.is_some(),
            self.invested_capital.is_some(),
            self.free_cash_flow.is_some(),
            self.operating_cash_flow.is_some(),
            self.current_price.is_some(),
            self.shares_outstanding > 0.0,
        ];
        let present = fields.iter().filter(|p| **p).count();
        self.data_completeness = present as f64 / fields.len() as f64;
        self
    }
}

/// Output of one model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEstimate {
    /// Fair value per share; None when the model is undefined for these
    /// inputs (the reason says why).
    pub fair_value: Option<f64>,
    pub reason: Option<String>,
    pub diagnostics: serde_json::Value,
}

impl ModelEstimate {
    pub fn value(fair_value: f64, diagnostics: serde_json::Value) -> Self {
        Self { fair_value: Some(fair_value), reason: None, diagnostics }
    }

    pub fn undefined(reason: impl Into<String>) -> Self {
        Self {
            fair_value: None,
            reason: Some(reason.into()),
            diagnostics: serde_json::Value::Null,
        }
    }
}
