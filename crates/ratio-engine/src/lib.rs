//! Deterministic ratio computation over one statement snapshot.
//!
//! Roughly fifty scalars across seven groups. Every ratio is a pure function
//! of the inputs: same statements, same market data, same output. Division by
//! zero or a missing line item yields None, never infinity or an error, and
//! downstream consumers treat None as missing. Growth ratios whose base
//! period changed sign are undefined and also None.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use valuation_core::stats::round_half_even;
use valuation_core::types::{BalanceSheet, IncomeStatement, MarketSnapshot, RatioSet, StatementSet};

/// Decimal places ratios are rounded to for storage (half-to-even).
const STORAGE_DP: u32 = 6;

fn d2f(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

fn safe_div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Average of the current and prior value of a balance-sheet item; falls
/// back to whichever side is present.
fn average(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(c), Some(p)) => Some((c + p) / 2.0),
        (Some(c), None) => Some(c),
        (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

/// YoY growth; undefined when the base is zero or the sign flipped.
fn growth(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let (c, p) = (current?, previous?);
    if p == 0.0 || c.signum() != p.signum() {
        return None;
    }
    Some((c - p) / p)
}

fn total_debt(balance: &BalanceSheet) -> Option<f64> {
    let long = d2f(balance.long_term_debt);
    let short = d2f(balance.short_term_debt);
    match (long, short) {
        (None, None) => None,
        (l, s) => Some(l.unwrap_or(0.0) + s.unwrap_or(0.0)),
    }
}

pub struct RatioEngine;

impl RatioEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the full ratio set for (company, as_of). Pure; reproducible
    /// bit-for-bit given identical inputs.
    pub fn compute(
        &self,
        as_of: NaiveDate,
        statements: &StatementSet,
        market: &MarketSnapshot,
    ) -> RatioSet {
        let mut ratios = RatioSet {
            as_of,
            ..Default::default()
        };

        let income = match &statements.income {
            Some(income) => income,
            None => return ratios,
        };
        let balance = match &statements.balance {
            Some(balance) => balance,
            None => return ratios,
        };
        ratios.company_id = income.company_id;
        let cash_flow = statements.cash_flow.as_ref();
        let prev_balance = statements.prev_balance.as_ref();
        let prev_income = statements.prev_income.as_ref();

        self.liquidity(&mut ratios, balance, cash_flow.map(|c| d2f(c.operating_cash_flow)).flatten());
        self.profitability(&mut ratios, income, balance);
        self.leverage(&mut ratios, income, balance);
        self.efficiency(&mut ratios, income, balance, prev_balance);
        self.market_value(&mut ratios, income, balance, cash_flow, market, prev_income);
        self.growth_group(&mut ratios, income, balance, prev_income, prev_balance);
        self.cash_flow_group(&mut ratios, income, balance, cash_flow);
        self.composite(&mut ratios, income, balance, market);

        round_set(&mut ratios);
        ratios
    }

    fn liquidity(&self, out: &mut RatioSet, balance: &BalanceSheet, ocf: Option<f64>) {
        let current_assets = d2f(balance.current_assets);
        let current_liabilities = d2f(balance.current_liabilities);

        out.current_ratio = safe_div(current_assets, current_liabilities);

        let quick_assets = match (current_assets, d2f(balance.inventory)) {
            (Some(ca), Some(inv)) => Some(ca - inv),
            (Some(ca), None) => Some(ca),
            _ => None,
        };
        out.quick_ratio = safe_div(quick_assets, current_liabilities);
        out.cash_ratio = safe_div(d2f(balance.cash_and_equivalents), current_liabilities);
        out.operating_cash_flow_ratio = safe_div(ocf, current_liabilities);

        let working_capital = match (current_assets, current_liabilities) {
            (Some(ca), Some(cl)) => Some(ca - cl),
            _ => None,
        };
        out.working_capital_ratio = safe_div(working_capital, d2f(balance.total_assets));
    }

    fn profitability(&self, out: &mut RatioSet, income: &IncomeStatement, balance: &BalanceSheet) {
        let revenue = d2f(income.revenue);
        let net_income = d2f(income.net_income);
        let operating_income = d2f(income.operating_income);

        out.gross_margin = safe_div(d2f(income.gross_profit), revenue);
        out.operating_margin = safe_div(operating_income, revenue);
        out.net_margin = safe_div(net_income, revenue);
        out.ebitda_margin = safe_div(d2f(income.ebitda), revenue);
        out.roa = safe_div(net_income, d2f(balance.total_assets));
        out.roe = safe_div(net_income, d2f(balance.total_equity));

        // ROIC: NOPAT over equity plus debt.
        let tax_rate = effective_tax_rate(income);
        out.effective_tax_rate = tax_rate;
        let nopat = match (operating_income, tax_rate) {
            (Some(oi), Some(t)) => Some(oi * (1.0 - t)),
            _ => None,
        };
        let invested_capital = match (d2f(balance.total_equity), total_debt(balance)) {
            (Some(eq), Some(debt)) => Some(eq + debt),
            (Some(eq), None) => Some(eq),
            _ => None,
        };
        out.roic = safe_div(nopat, invested_capital);

        // ROCE: EBIT over capital employed (assets less current liabilities).
        let capital_employed = match (d2f(balance.total_assets), d2f(balance.current_liabilities)) {
            (Some(ta), Some(cl)) => Some(ta - cl),
            _ => None,
        };
        out.roce = safe_div(operating_income, capital_employed);
    }

    fn leverage(&self, out: &mut RatioSet, income: &IncomeStatement, balance: &BalanceSheet) {
        let debt = total_debt(balance);
        let equity = d2f(balance.total_equity);

        out.debt_to_equity = safe_div(debt, equity);
        out.debt_to_assets = safe_div(debt, d2f(balance.total_assets));
        out.equity_multiplier = safe_div(d2f(balance.total_assets), equity);
        out.interest_coverage =
            safe_div(d2f(income.operating_income), d2f(income.interest_expense));
        out.debt_service_coverage =
            safe_div(d2f(income.operating_income), d2f(income.interest_expense));

        let net_debt = match (debt, d2f(balance.cash_and_equivalents)) {
            (Some(d), Some(cash)) => Some(d - cash),
            (Some(d), None) => Some(d),
            _ => None,
        };
        out.net_debt_to_ebitda = safe_div(net_debt, d2f(income.ebitda));
    }

    fn efficiency(
        &self,
        out: &mut RatioSet,
        income: &IncomeStatement,
        balance: &BalanceSheet,
        prev: Option<&BalanceSheet>,
    ) {
        let revenue = d2f(income.revenue);
        let cogs = d2f(income.cost_of_revenue);

        let avg_assets = average(
            d2f(balance.total_assets),
            prev.and_then(|p| d2f(p.total_assets)),
        );
        let avg_ppe = average(
            d2f(balance.property_plant_equipment),
            prev.and_then(|p| d2f(p.property_plant_equipment)),
        );
        let avg_inventory = average(
            d2f(balance.inventory),
            prev.and_then(|p| d2f(p.inventory)),
        );
        let avg_receivables = average(
            d2f(balance.accounts_receivable),
            prev.and_then(|p| d2f(p.accounts_receivable)),
        );
        let avg_payables = average(
            d2f(balance.accounts_payable),
            prev.and_then(|p| d2f(p.accounts_payable)),
        );

        out.asset_turnover = safe_div(revenue, avg_assets);
        out.fixed_asset_turnover = safe_div(revenue, avg_ppe);
        out.inventory_turnover = safe_div(cogs, avg_inventory);
        out.receivables_turnover = safe_div(revenue, avg_receivables);
        out.payables_turnover = safe_div(cogs, avg_payables);

        out.days_sales_outstanding = safe_div(Some(365.0), out.receivables_turnover);
        out.days_inventory_outstanding = safe_div(Some(365.0), out.inventory_turnover);
        out.days_payable_outstanding = safe_div(Some(365.0), out.payables_turnover);

        out.cash_conversion_cycle = match (
            out.days_sales_outstanding,
            out.days_inventory_outstanding,
            out.days_payable_outstanding,
        ) {
            (Some(dso), Some(dio), Some(dpo)) => Some(dso + dio - dpo),
            _ => None,
        };
    }

    fn market_value(
        &self,
        out: &mut RatioSet,
        income: &IncomeStatement,
        balance: &BalanceSheet,
        cash_flow: Option<&valuation_core::types::CashFlowStatement>,
        market: &MarketSnapshot,
        prev_income: Option<&IncomeStatement>,
    ) {
        let price = d2f(market.close_price);
        let market_cap = d2f(market.market_cap);
        let shares = d2f(market.shares_outstanding);
        let revenue = d2f(income.revenue);

        let eps = d2f(income.eps).or_else(|| safe_div(d2f(income.net_income), shares));
        out.eps = eps;
        out.pe_ratio = match (price, eps) {
            (Some(p), Some(e)) if e > 0.0 => Some(p / e),
            _ => None,
        };

        let bvps = safe_div(d2f(balance.total_equity), shares);
        out.book_value_per_share = bvps;
        out.pb_ratio = match (price, bvps) {
            (Some(p), Some(b)) if b > 0.0 => Some(p / b),
            _ => None,
        };

        out.ps_ratio = safe_div(market_cap, revenue);

        let enterprise_value = match (market_cap, total_debt(balance)) {
            (Some(cap), debt) => {
                let cash = d2f(balance.cash_and_equivalents).unwrap_or(0.0);
                Some(cap + debt.unwrap_or(0.0) - cash)
            }
            _ => None,
        };
        out.ev_to_revenue = safe_div(enterprise_value, revenue);
        out.ev_to_ebitda = safe_div(enterprise_value, d2f(income.ebitda));
        out.ev_to_ebit = safe_div(enterprise_value, d2f(income.operating_income));

        let ocf_per_share = cash_flow
            .and_then(|cf| safe_div(d2f(cf.operating_cash_flow), shares));
        out.price_to_cash_flow = match (price, ocf_per_share) {
            (Some(p), Some(c)) if c > 0.0 => Some(p / c),
            _ => None,
        };

        let fcf_per_share = cash_flow.and_then(|cf| {
            let fcf = d2f(cf.free_cash_flow).or_else(|| {
                match (d2f(cf.operating_cash_flow), d2f(cf.capital_expenditures)) {
                    // Capex is reported negative.
                    (Some(ocf), Some(capex)) => Some(ocf + capex),
                    _ => None,
                }
            });
            safe_div(fcf, shares)
        });
        out.price_to_fcf = match (price, fcf_per_share) {
            (Some(p), Some(f)) if f > 0.0 => Some(p / f),
            _ => None,
        };

        let dividends = cash_flow.and_then(|cf| d2f(cf.dividends_paid)).map(f64::abs);
        let dividend_per_share = safe_div(dividends, shares);
        out.dividend_yield = match (dividend_per_share, price) {
            (Some(d), Some(p)) if p > 0.0 => Some(d / p),
            _ => None,
        };

        out.earnings_yield = out.pe_ratio.and_then(|pe| if pe != 0.0 { Some(1.0 / pe) } else { None });

        // PEG uses YoY EPS growth in percent.
        let prev_eps = prev_income.and_then(|p| d2f(p.eps));
        let eps_growth_pct = growth(eps, prev_eps).map(|g| g * 100.0);
        out.peg_ratio = match (out.pe_ratio, eps_growth_pct) {
            (Some(pe), Some(g)) if g > 0.0 => Some(pe / g),
            _ => None,
        };
    }

    fn growth_group(
        &self,
        out: &mut RatioSet,
        income: &IncomeStatement,
        balance: &BalanceSheet,
        prev_income: Option<&IncomeStatement>,
        prev_balance: Option<&BalanceSheet>,
    ) {
        if let Some(prev) = prev_income {
            out.revenue_growth_yoy = growth(d2f(income.revenue), d2f(prev.revenue));
            out.net_income_growth_yoy = growth(d2f(income.net_income), d2f(prev.net_income));
            out.eps_growth_yoy = growth(d2f(income.eps), d2f(prev.eps));
            out.ebitda_growth_yoy = growth(d2f(income.ebitda), d2f(prev.ebitda));
        }
        if let Some(prev) = prev_balance {
            out.total_assets_growth_yoy =
                growth(d2f(balance.total_assets), d2f(prev.total_assets));
        }
    }

    fn cash_flow_group(
        &self,
        out: &mut RatioSet,
        income: &IncomeStatement,
        balance: &BalanceSheet,
        cash_flow: Option<&valuation_core::types::CashFlowStatement>,
    ) {
        let cash_flow = match cash_flow {
            Some(cf) => cf,
            None => return,
        };
        let revenue = d2f(income.revenue);
        let ocf = d2f(cash_flow.operating_cash_flow);

        out.operating_cf_margin = safe_div(ocf, revenue);

        let fcf = d2f(cash_flow.free_cash_flow).or_else(|| {
            match (ocf, d2f(cash_flow.capital_expenditures)) {
                (Some(o), Some(capex)) => Some(o + capex),
                _ => None,
            }
        });
        out.fcf_margin = safe_div(fcf, revenue);
        out.fcf_to_net_income = safe_div(fcf, d2f(income.net_income));
        out.cash_flow_coverage = safe_div(ocf, total_debt(balance));
    }

    /// Composite risk inputs: Altman Z-score from its five components.
    fn composite(
        &self,
        out: &mut RatioSet,
        income: &IncomeStatement,
        balance: &BalanceSheet,
        market: &MarketSnapshot,
    ) {
        let total_assets = match d2f(balance.total_assets) {
            Some(ta) if ta > 0.0 => ta,
            _ => return,
        };
        let total_liabilities = match d2f(balance.total_liabilities) {
            Some(tl) if tl > 0.0 => tl,
            _ => return,
        };

        let working_capital = match (d2f(balance.current_assets), d2f(balance.current_liabilities))
        {
            (Some(ca), Some(cl)) => ca - cl,
            _ => return,
        };
        let retained = d2f(balance.retained_earnings).unwrap_or(0.0);
        let ebit = match d2f(income.operating_income) {
            Some(oi) => oi,
            None => return,
        };
        let sales = match d2f(income.revenue) {
            Some(rev) => rev,
            None => return,
        };
        let market_equity = d2f(market.market_cap)
            .or_else(|| d2f(balance.total_equity))
            .unwrap_or(0.0);

        let z = 1.2 * (working_capital / total_assets)
            + 1.4 * (retained / total_assets)
            + 3.3 * (ebit / total_assets)
            + 0.6 * (market_equity / total_liabilities)
            + 1.0 * (sales / total_assets);
        out.altman_z_score = Some(z);
    }
}

impl Default for RatioEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn effective_tax_rate(income: &IncomeStatement) -> Option<f64> {
    let pre_tax = d2f(income.income_before_tax)?;
    if pre_tax == 0.0 {
        return None;
    }
    let tax = d2f(income.income_tax_expense)?;
    Some((tax / pre_tax).abs())
}

/// Apply the storage rounding mode to every populated ratio.
fn round_set(ratios: &mut RatioSet) {
    let fields: [&mut Option<f64>; 48] = [
        &mut ratios.current_ratio,
        &mut ratios.quick_ratio,
        &mut ratios.cash_ratio,
        &mut ratios.operating_cash_flow_ratio,
        &mut ratios.working_capital_ratio,
        &mut ratios.gross_margin,
        &mut ratios.operating_margin,
        &mut ratios.net_margin,
        &mut ratios.ebitda_margin,
        &mut ratios.roa,
        &mut ratios.roe,
        &mut ratios.roic,
        &mut ratios.roce,
        &mut ratios.debt_to_equity,
        &mut ratios.debt_to_assets,
        &mut ratios.equity_multiplier,
        &mut ratios.interest_coverage,
        &mut ratios.debt_service_coverage,
        &mut ratios.net_debt_to_ebitda,
        &mut ratios.asset_turnover,
        &mut ratios.fixed_asset_turnover,
        &mut ratios.inventory_turnover,
        &mut ratios.receivables_turnover,
        &mut ratios.payables_turnover,
        &mut ratios.days_sales_outstanding,
        &mut ratios.days_inventory_outstanding,
        &mut ratios.days_payable_outstanding,
        &mut ratios.cash_conversion_cycle,
        &mut ratios.pe_ratio,
        &mut ratios.pb_ratio,
        &mut ratios.ps_ratio,
        &mut ratios.ev_to_revenue,
        &mut ratios.ev_to_ebitda,
        &mut ratios.ev_to_ebit,
        &mut ratios.price_to_cash_flow,
        &mut ratios.price_to_fcf,
        &mut ratios.dividend_yield,
        &mut ratios.earnings_yield,
        &mut ratios.peg_ratio,
        &mut ratios.revenue_growth_yoy,
        &mut ratios.net_income_growth_yoy,
        &mut ratios.eps_growth_yoy,
        &mut ratios.ebitda_growth_yoy,
        &mut ratios.total_assets_growth_yoy,
        &mut ratios.operating_cf_margin,
        &mut ratios.fcf_margin,
        &mut ratios.fcf_to_net_income,
        &mut ratios.cash_flow_coverage,
    ];
    for field in fields {
        if let Some(v) = field {
            *v = round_half_even(*v, STORAGE_DP);
        }
    }
    if let Some(z) = &mut ratios.altman_z_score {
        *z = round_half_even(*z, STORAGE_DP);
    }
    if let Some(t) = &mut ratios.effective_tax_rate {
        *t = round_half_even(*t, STORAGE_DP);
    }
    if let Some(e) = &mut ratios.eps {
        *e = round_half_even(*e, STORAGE_DP);
    }
    if let Some(b) = &mut ratios.book_value_per_share {
        *b = round_half_even(*b, STORAGE_DP);
    }
}
