//! The eight estimators.

use serde_json::json;

use valuation_core::types::ModelId;

use crate::inputs::{ModelEstimate, ModelInputs};

/// Dispatch a model by id.
pub fn estimate(model: ModelId, inputs: &ModelInputs) -> ModelEstimate {
    match model {
        ModelId::Dcf => dcf(inputs),
        ModelId::Rim => rim(inputs),
        ModelId::Eva => eva(inputs),
        ModelId::Graham => graham_number(inputs),
        ModelId::PeterLynch => peter_lynch(inputs),
        ModelId::Ncav => ncav(inputs),
        ModelId::PriceSales => price_sales(inputs),
        ModelId::PriceCashFlow => price_cashflow(inputs),
    }
}

/// Discounted cash flow with a Gordon-growth terminal value.
///
/// Projects FCF over the schedule, discounts at WACC, subtracts net debt
/// and divides by shares.
pub fn dcf(inputs: &ModelInputs) -> ModelEstimate {
    let base_fcf = match inputs.free_cash_flow.or(inputs.operating_cash_flow) {
        Some(fcf) => fcf,
        None => return ModelEstimate::undefined("insufficient_data: no free cash flow"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    if inputs.wacc <= inputs.terminal_growth {
        return ModelEstimate::undefined("undefined_formula: WACC <= terminal_growth");
    }

    let years = inputs.projection_years.max(1);
    let mut projected = Vec::with_capacity(years);
    let mut fcf = base_fcf;
    for year in 0..years {
        let growth = inputs
            .growth_schedule
            .get(year)
            .copied()
            .unwrap_or(inputs.terminal_growth);
        fcf *= 1.0 + growth;
        projected.push(fcf);
    }

    let mut pv = 0.0;
    for (year, cash) in projected.iter().enumerate() {
        pv += cash / (1.0 + inputs.wacc).powi(year as i32 + 1);
    }

    let final_fcf = projected[projected.len() - 1];
    let terminal_value =
        final_fcf * (1.0 + inputs.terminal_growth) / (inputs.wacc - inputs.terminal_growth);
    let pv_terminal = terminal_value / (1.0 + inputs.wacc).powi(years as i32);

    let enterprise_value = pv + pv_terminal;
    let equity_value = enterprise_value - inputs.net_debt.unwrap_or(0.0);
    let fair_value = equity_value / inputs.shares_outstanding;

    ModelEstimate::value(
        fair_value,
        json!({
            "base_fcf": base_fcf,
            "wacc": inputs.wacc,
            "terminal_growth": inputs.terminal_growth,
            "enterprise_value": enterprise_value,
            "terminal_value": terminal_value,
            "projection_years": years,
        }),
    )
}

/// Ohlson residual income: book value plus discounted excess earnings.
pub fn rim(inputs: &ModelInputs) -> ModelEstimate {
    let book = match inputs.book_value {
        Some(b) if b > 0.0 => b,
        _ => return ModelEstimate::undefined("insufficient_data: book value"),
    };
    let earnings = match inputs.net_income {
        Some(e) => e,
        None => return ModelEstimate::undefined("insufficient_data: net income"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    let r = inputs.cost_of_equity;
    if r <= inputs.terminal_growth {
        return ModelEstimate::undefined("undefined_formula: cost of equity <= terminal_growth");
    }

    let years = inputs.projection_years.max(1);
    let mut value = book;
    let mut current_book = book;
    let mut current_earnings = earnings;
    let mut last_residual = 0.0;
    for year in 0..years {
        let growth = inputs
            .growth_schedule
            .get(year)
            .copied()
            .unwrap_or(inputs.terminal_growth);
        current_earnings *= 1.0 + growth;
        let residual = current_earnings - r * current_book;
        value += residual / (1.0 + r).powi(year as i32 + 1);
        current_book += current_earnings;
        last_residual = residual;
    }

    // Terminal residual income as a fading perpetuity.
    let terminal = last_residual * (1.0 + inputs.terminal_growth) / (r - inputs.terminal_growth);
    value += terminal / (1.0 + r).powi(years as i32);

    ModelEstimate::value(
        value / inputs.shares_outstanding,
        json!({
            "book_value": book,
            "cost_of_equity": r,
            "last_residual_income": last_residual,
        }),
    )
}

/// Economic value added: invested capital plus discounted economic profit.
pub fn eva(inputs: &ModelInputs) -> ModelEstimate {
    let invested = match inputs.invested_capital {
        Some(ic) if ic > 0.0 => ic,
        _ => return ModelEstimate::undefined("insufficient_data: invested capital"),
    };
    let operating_income = match inputs.operating_income {
        Some(oi) => oi,
        None => return ModelEstimate::undefined("insufficient_data: operating income"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    if inputs.wacc <= inputs.terminal_growth {
        return ModelEstimate::undefined("undefined_formula: WACC <= terminal_growth");
    }

    let years = inputs.projection_years.max(1);
    let mut nopat = operating_income * (1.0 - inputs.tax_rate);
    let mut pv_eva = 0.0;
    let mut last_eva = 0.0;
    for year in 0..years {
        let growth = inputs
            .growth_schedule
            .get(year)
            .copied()
            .unwrap_or(inputs.terminal_growth);
        nopat *= 1.0 + growth;
        let economic_profit = nopat - inputs.wacc * invested;
        pv_eva += economic_profit / (1.0 + inputs.wacc).powi(year as i32 + 1);
        last_eva = economic_profit;
    }

    let terminal =
        last_eva * (1.0 + inputs.terminal_growth) / (inputs.wacc - inputs.terminal_growth);
    let pv_terminal = terminal / (1.0 + inputs.wacc).powi(years as i32);

    let enterprise_value = invested + pv_eva + pv_terminal;
    let equity_value = enterprise_value - inputs.total_debt.unwrap_or(0.0);

    ModelEstimate::value(
        equity_value / inputs.shares_outstanding,
        json!({
            "invested_capital": invested,
            "wacc": inputs.wacc,
            "pv_economic_profit": pv_eva,
            "enterprise_value": enterprise_value,
        }),
    )
}

/// Graham number: sqrt(22.5 · EPS · BVPS). Needs both positive.
pub fn graham_number(inputs: &ModelInputs) -> ModelEstimate {
    let eps = inputs.eps.unwrap_or(f64::NAN);
    let bvps = inputs.book_value_per_share.unwrap_or(f64::NAN);
    if !(eps > 0.0) || !(bvps > 0.0) {
        return ModelEstimate::undefined("undefined_formula: requires EPS > 0 and BVPS > 0");
    }
    let fair_value = (22.5 * eps * bvps).sqrt();
    ModelEstimate::value(fair_value, json!({ "eps": eps, "bvps": bvps }))
}

/// Peter Lynch fair value: fair P/E equal to the growth rate (in percent).
pub fn peter_lynch(inputs: &ModelInputs) -> ModelEstimate {
    let eps = match inputs.eps {
        Some(e) if e > 0.0 => e,
        _ => return ModelEstimate::undefined("undefined_formula: requires EPS > 0"),
    };
    let growth_pct = inputs.growth_rate * 100.0;
    if growth_pct <= 0.0 {
        return ModelEstimate::undefined("undefined_formula: requires positive growth");
    }
    let fair_pe = growth_pct;
    let fair_value = fair_pe * eps;

    // Lynch ratio for the diagnostics: (growth% + dividend yield%) / P/E.
    let lynch_ratio = inputs.current_price.and_then(|price| {
        if price > 0.0 {
            let pe = price / eps;
            Some((growth_pct + inputs.dividend_yield * 100.0) / pe)
        } else {
            None
        }
    });

    ModelEstimate::value(
        fair_value,
        json!({ "fair_pe": fair_pe, "growth_pct": growth_pct, "lynch_ratio": lynch_ratio }),
    )
}

/// Net current asset value per share. A negative result is a valid distress
/// signal, not an error.
pub fn ncav(inputs: &ModelInputs) -> ModelEstimate {
    let current_assets = match inputs.current_assets {
        Some(ca) => ca,
        None => return ModelEstimate::undefined("insufficient_data: current assets"),
    };
    let total_liabilities = match inputs.total_liabilities {
        Some(tl) => tl,
        None => return ModelEstimate::undefined("insufficient_data: total liabilities"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    let ncav = (current_assets - total_liabilities) / inputs.shares_outstanding;
    ModelEstimate::value(
        ncav,
        json!({ "current_assets": current_assets, "total_liabilities": total_liabilities }),
    )
}

/// Industry-median price/sales times revenue per share.
pub fn price_sales(inputs: &ModelInputs) -> ModelEstimate {
    let median = match inputs.industry_ps {
        Some(m) if m > 0.0 => m,
        _ => return ModelEstimate::undefined("insufficient_data: industry P/S median"),
    };
    let revenue = match inputs.revenue {
        Some(r) if r > 0.0 => r,
        _ => return ModelEstimate::undefined("insufficient_data: revenue"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    let revenue_per_share = revenue / inputs.shares_outstanding;
    ModelEstimate::value(
        median * revenue_per_share,
        json!({ "industry_ps": median, "revenue_per_share": revenue_per_share }),
    )
}

/// Industry-median price/cash-flow times operating CF per share.
pub fn price_cashflow(inputs: &ModelInputs) -> ModelEstimate {
    let median = match inputs.industry_pcf {
        Some(m) if m > 0.0 => m,
        _ => return ModelEstimate::undefined("insufficient_data: industry P/CF median"),
    };
    let ocf = match inputs.operating_cash_flow {
        Some(c) if c > 0.0 => c,
        _ => return ModelEstimate::undefined("insufficient_data: operating cash flow"),
    };
    if inputs.shares_outstanding <= 0.0 {
        return ModelEstimate::undefined("insufficient_data: shares outstanding");
    }
    let ocf_per_share = ocf / inputs.shares_outstanding;
    ModelEstimate::value(
        median * ocf_per_share,
        json!({ "industry_pcf": median, "ocf_per_share": ocf_per_share }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_inputs() -> ModelInputs {
        ModelInputs {
            shares_outstanding: 1_000_000_000.0,
            current_price: Some(120.0),
            eps: Some(6.50),
            revenue: Some(100_000_000_000.0),
            net_income: Some(15_000_000_000.0),
            operating_income: Some(20_000_000_000.0),
            book_value: Some(28_000_000_000.0),
            book_value_per_share: Some(28.0),
            current_assets: Some(50_000_000_000.0),
            total_liabilities: Some(90_000_000_000.0),
            total_debt: Some(45_000_000_000.0),
            net_debt: Some(25_000_000_000.0),
            invested_capital: Some(150_000_000_000.0),
            free_cash_flow: Some(12_000_000_000.0),
            operating_cash_flow: Some(18_000_000_000.0),
            wacc: 0.09,
            cost_of_equity: 0.10,
            terminal_growth: 0.025,
            tax_rate: 0.21,
            growth_schedule: vec![0.06, 0.05, 0.04, 0.03, 0.03],
            growth_rate: 0.10,
            dividend_yield: 0.01,
            industry_ps: Some(2.5),
            industry_pcf: Some(12.0),
            projection_years: 5,
            data_completeness: 1.0,
        }
    }

    #[test]
    fn test_dcf_produces_positive_value() {
        let estimate = dcf(&healthy_inputs());
        let value = estimate.fair_value.unwrap();
        assert!(value > 0.0);
        // PV of ~12B growing FCF at 9% less 25B net debt over 1B shares
        // lands in the low hundreds.
        assert!(value > 50.0 && value < 500.0, "got {value}");
    }

    #[test]
    fn test_dcf_rejects_wacc_below_terminal_growth() {
        let mut inputs = healthy_inputs();
        inputs.wacc = 0.04;
        inputs.terminal_growth = 0.05;
        let estimate = dcf(&inputs);
        assert!(estimate.fair_value.is_none());
        assert!(estimate.reason.unwrap().starts_with("undefined_formula"));
    }

    #[test]
    fn test_graham_number() {
        let estimate = graham_number(&healthy_inputs());
        let expected = (22.5f64 * 6.50 * 28.0).sqrt();
        assert!((estimate.fair_value.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_graham_undefined_for_negative_eps() {
        let mut inputs = healthy_inputs();
        inputs.eps = Some(-1.0);
        let estimate = graham_number(&inputs);
        assert!(estimate.fair_value.is_none());
    }

    #[test]
    fn test_ncav_negative_is_valid() {
        let estimate = ncav(&healthy_inputs());
        let value = estimate.fair_value.unwrap();
        assert!(value < 0.0, "liabilities exceed current assets here");
    }

    #[test]
    fn test_peter_lynch() {
        let estimate = peter_lynch(&healthy_inputs());
        // growth 10% -> fair P/E 10 -> 10 * 6.50
        assert!((estimate.fair_value.unwrap() - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_models_need_medians() {
        let mut inputs = healthy_inputs();
        inputs.industry_ps = None;
        assert!(price_sales(&inputs).fair_value.is_none());
        inputs.industry_pcf = None;
        assert!(price_cashflow(&inputs).fair_value.is_none());
    }

    #[test]
    fn test_rim_and_eva_defined() {
        assert!(rim(&healthy_inputs()).fair_value.is_some());
        assert!(eva(&healthy_inputs()).fair_value.is_some());
    }
}
