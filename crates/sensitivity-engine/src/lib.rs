//! Sensitivity analysis over the DCF parameter set.
//!
//! One-way sweeps, two-way grids, tornado rankings and a seeded Monte Carlo
//! simulation. Everything is deterministic: the Monte Carlo uses a caller
//! seed and a fixed draw order, so the same request reproduces the same
//! percentile table byte for byte.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, Triangular, Uniform};

use valuation_core::stats;

/// Base parameters for the simple DCF the analyses rerun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityParams {
    pub fcf: f64,
    pub wacc: f64,
    pub terminal_growth: f64,
    pub years: usize,
}

impl Default for SensitivityParams {
    fn default() -> Self {
        Self { fcf: 100.0, wacc: 0.10, terminal_growth: 0.025, years: 5 }
    }
}

/// The parameters a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variable {
    Fcf,
    Wacc,
    TerminalGrowth,
}

impl Variable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Fcf => "fcf",
            Variable::Wacc => "wacc",
            Variable::TerminalGrowth => "terminal_growth",
        }
    }

    fn get(&self, params: &SensitivityParams) -> f64 {
        match self {
            Variable::Fcf => params.fcf,
            Variable::Wacc => params.wacc,
            Variable::TerminalGrowth => params.terminal_growth,
        }
    }

    fn set(&self, params: &mut SensitivityParams, value: f64) {
        match self {
            Variable::Fcf => params.fcf = value,
            Variable::Wacc => params.wacc = value,
            Variable::TerminalGrowth => params.terminal_growth = value,
        }
    }

    /// Hard bounds keeping a draw inside economically meaningful territory.
    fn clamp(&self, value: f64) -> f64 {
        match self {
            Variable::Fcf => value,
            Variable::Wacc => value.clamp(0.01, 0.30),
            Variable::TerminalGrowth => value.clamp(0.0, 0.10),
        }
    }
}

/// Enterprise value from projected FCF plus a Gordon terminal value.
/// Returns None when WACC does not exceed terminal growth.
pub fn dcf_enterprise_value(params: &SensitivityParams) -> Option<f64> {
    if params.wacc <= params.terminal_growth {
        return None;
    }
    let mut pv = 0.0;
    let mut fcf = params.fcf;
    for year in 1..=params.years.max(1) {
        fcf *= 1.0 + params.terminal_growth;
        pv += fcf / (1.0 + params.wacc).powi(year as i32);
    }
    let terminal_fcf = fcf * (1.0 + params.terminal_growth);
    let terminal_value = terminal_fcf / (params.wacc - params.terminal_growth);
    let pv_terminal = terminal_value / (1.0 + params.wacc).powi(params.years.max(1) as i32);
    Some(pv + pv_terminal)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWayPoint {
    pub value: f64,
    pub change_pct: f64,
    pub fair_value: Option<f64>,
    pub fair_value_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWayReport {
    pub variable: Variable,
    pub base_value: f64,
    pub base_fair_value: Option<f64>,
    pub points: Vec<OneWayPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoWayReport {
    pub variable_x: Variable,
    pub variable_y: Variable,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
    /// Row-major grid indexed [y][x].
    pub grid: Vec<Vec<Option<f64>>>,
    pub base_fair_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoBar {
    pub variable: Variable,
    pub base_value: f64,
    pub low_fair_value: Option<f64>,
    pub high_fair_value: Option<f64>,
    pub impact: f64,
}

/// Sampling distribution for one Monte Carlo variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Distribution {
    Normal { mean: f64, std: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

impl Distribution {
    /// Inverse-CDF sampling from a uniform draw, so a fixed draw sequence
    /// reproduces the same sample regardless of platform.
    fn sample(&self, quantile: f64) -> f64 {
        let q = quantile.clamp(1e-12, 1.0 - 1e-12);
        match self {
            Distribution::Normal { mean, std } => match Normal::new(*mean, (*std).max(1e-12)) {
                Ok(dist) => dist.inverse_cdf(q),
                Err(_) => *mean,
            },
            Distribution::Triangular { min, mode, max } => {
                match Triangular::new(*min, *max, *mode) {
                    Ok(dist) => dist.inverse_cdf(q),
                    Err(_) => *mode,
                }
            }
            Distribution::Uniform { min, max } => match Uniform::new(*min, *max) {
                Ok(dist) => dist.inverse_cdf(q),
                Err(_) => (*min + *max) / 2.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloStats {
    pub simulations: usize,
    pub valid_simulations: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Percentiles at 5, 10, 25, 50, 75, 90, 95.
    pub percentiles: [(u8, f64); 7],
    pub ci_80: (f64, f64),
    pub ci_90: (f64, f64),
}

pub struct SensitivityAnalyzer;

impl SensitivityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Vary one parameter across `n_points` between the range endpoints
    /// (inclusive) and re-run the valuation at each point.
    pub fn one_way(
        &self,
        base: &SensitivityParams,
        variable: Variable,
        range: (f64, f64),
        n_points: usize,
    ) -> OneWayReport {
        let base_value = variable.get(base);
        let base_fair_value = dcf_enterprise_value(base);
        let n = n_points.max(2);

        let points = (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                let value = range.0 + t * (range.1 - range.0);
                let mut params = base.clone();
                variable.set(&mut params, value);
                let fair_value = dcf_enterprise_value(&params);
                let fair_value_change_pct = match (fair_value, base_fair_value) {
                    (Some(v), Some(b)) if b != 0.0 => Some((v - b) / b * 100.0),
                    _ => None,
                };
                OneWayPoint {
                    value,
                    change_pct: if base_value != 0.0 {
                        (value - base_value) / base_value * 100.0
                    } else {
                        0.0
                    },
                    fair_value,
                    fair_value_change_pct,
                }
            })
            .collect();

        OneWayReport { variable, base_value, base_fair_value, points }
    }

    /// Cartesian product of two one-way sweeps.
    pub fn two_way(
        &self,
        base: &SensitivityParams,
        variable_x: Variable,
        variable_y: Variable,
        range_x: (f64, f64),
        range_y: (f64, f64),
        nx: usize,
        ny: usize,
    ) -> TwoWayReport {
        let nx = nx.max(2);
        let ny = ny.max(2);
        let x_values: Vec<f64> = (0..nx)
            .map(|i| range_x.0 + (i as f64 / (nx - 1) as f64) * (range_x.1 - range_x.0))
            .collect();
        let y_values: Vec<f64> = (0..ny)
            .map(|j| range_y.0 + (j as f64 / (ny - 1) as f64) * (range_y.1 - range_y.0))
            .collect();

        let grid = y_values
            .iter()
            .map(|y| {
                x_values
                    .iter()
                    .map(|x| {
                        let mut params = base.clone();
                        variable_x.set(&mut params, *x);
                        variable_y.set(&mut params, *y);
                        dcf_enterprise_value(&params)
                    })
                    .collect()
            })
            .collect();

        TwoWayReport {
            variable_x,
            variable_y,
            x_values,
            y_values,
            grid,
            base_fair_value: dcf_enterprise_value(base),
        }
    }

    /// Fair values at base ± pct for each variable, ranked by |impact|.
    pub fn tornado(
        &self,
        base: &SensitivityParams,
        variables: &[Variable],
        pct: f64,
    ) -> Vec<TornadoBar> {
        let mut bars: Vec<TornadoBar> = variables
            .iter()
            .map(|variable| {
                let base_value = variable.get(base);

                let mut low_params = base.clone();
                variable.set(&mut low_params, base_value * (1.0 - pct));
                let low = dcf_enterprise_value(&low_params);

                let mut high_params = base.clone();
                variable.set(&mut high_params, base_value * (1.0 + pct));
                let high = dcf_enterprise_value(&high_params);

                let impact = match (low, high) {
                    (Some(l), Some(h)) => (h - l).abs(),
                    _ => 0.0,
                };
                TornadoBar {
                    variable: *variable,
                    base_value,
                    low_fair_value: low,
                    high_fair_value: high,
                    impact,
                }
            })
            .collect();

        bars.sort_by(|a, b| b.impact.partial_cmp(&a.impact).unwrap_or(std::cmp::Ordering::Equal));
        bars
    }

    /// Seeded Monte Carlo: independent draws per variable, valuation per
    /// sample, percentile table over the valid runs.
    pub fn monte_carlo(
        &self,
        base: &SensitivityParams,
        distributions: &[(Variable, Distribution)],
        simulations: usize,
        seed: u64,
    ) -> MonteCarloStats {
        use rand::Rng;

        let n = simulations.max(1);

        // Pre-draw the uniform quantiles sequentially from the seeded RNG so
        // the sample set is independent of the evaluation parallelism.
        let mut rng = StdRng::seed_from_u64(seed);
        let draws: Vec<Vec<f64>> = (0..n)
            .map(|_| distributions.iter().map(|_| rng.gen::<f64>()).collect())
            .collect();

        let values: Vec<f64> = draws
            .par_iter()
            .filter_map(|quantiles| {
                let mut params = base.clone();
                for ((variable, distribution), q) in distributions.iter().zip(quantiles.iter()) {
                    let drawn = variable.clamp(distribution.sample(*q));
                    variable.set(&mut params, drawn);
                }
                dcf_enterprise_value(&params)
            })
            .collect();

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let pct = |p: f64| stats::percentile_sorted(&sorted, p);
        let percentiles = [
            (5u8, pct(5.0)),
            (10, pct(10.0)),
            (25, pct(25.0)),
            (50, pct(50.0)),
            (75, pct(75.0)),
            (90, pct(90.0)),
            (95, pct(95.0)),
        ];

        MonteCarloStats {
            simulations: n,
            valid_simulations: sorted.len(),
            mean: stats::mean(&sorted),
            median: pct(50.0),
            std_dev: stats::std_dev(&sorted),
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            percentiles,
            ci_80: (pct(10.0), pct(90.0)),
            ci_90: (pct(5.0), pct(95.0)),
        }
    }
}

impl Default for SensitivityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distributions() -> Vec<(Variable, Distribution)> {
        vec![
            (Variable::Wacc, Distribution::Normal { mean: 0.10, std: 0.02 }),
            (
                Variable::TerminalGrowth,
                Distribution::Triangular { min: 0.01, mode: 0.025, max: 0.04 },
            ),
            (Variable::Fcf, Distribution::Uniform { min: 80.0, max: 120.0 }),
        ]
    }

    #[test]
    fn test_dcf_undefined_when_wacc_at_growth() {
        let params = SensitivityParams { wacc: 0.02, terminal_growth: 0.02, ..Default::default() };
        assert!(dcf_enterprise_value(&params).is_none());
    }

    #[test]
    fn test_one_way_wacc_monotone_decreasing() {
        let analyzer = SensitivityAnalyzer::new();
        let report = analyzer.one_way(
            &SensitivityParams::default(),
            Variable::Wacc,
            (0.07, 0.13),
            11,
        );
        assert_eq!(report.points.len(), 11);
        let values: Vec<f64> = report.points.iter().filter_map(|p| p.fair_value).collect();
        for window in values.windows(2) {
            assert!(window[0] > window[1], "EV should fall as WACC rises");
        }
        // Endpoints are inclusive.
        assert!((report.points[0].value - 0.07).abs() < 1e-12);
        assert!((report.points[10].value - 0.13).abs() < 1e-12);
    }

    #[test]
    fn test_two_way_grid_shape() {
        let analyzer = SensitivityAnalyzer::new();
        let report = analyzer.two_way(
            &SensitivityParams::default(),
            Variable::Wacc,
            Variable::TerminalGrowth,
            (0.08, 0.12),
            (0.01, 0.04),
            7,
            5,
        );
        assert_eq!(report.grid.len(), 5);
        assert!(report.grid.iter().all(|row| row.len() == 7));
    }

    #[test]
    fn test_tornado_sorted_by_impact() {
        let analyzer = SensitivityAnalyzer::new();
        let bars = analyzer.tornado(
            &SensitivityParams::default(),
            &[Variable::Fcf, Variable::Wacc, Variable::TerminalGrowth],
            0.20,
        );
        assert_eq!(bars.len(), 3);
        for window in bars.windows(2) {
            assert!(window[0].impact >= window[1].impact);
        }
    }

    #[test]
    fn test_monte_carlo_reproducible_with_same_seed() {
        let analyzer = SensitivityAnalyzer::new();
        let base = SensitivityParams::default();
        let a = analyzer.monte_carlo(&base, &distributions(), 10_000, 42);
        let b = analyzer.monte_carlo(&base, &distributions(), 10_000, 42);
        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.mean.to_bits(), b.mean.to_bits());

        let c = analyzer.monte_carlo(&base, &distributions(), 10_000, 43);
        assert_ne!(a.percentiles, c.percentiles);
    }

    #[test]
    fn test_monte_carlo_percentiles_ordered() {
        let analyzer = SensitivityAnalyzer::new();
        let stats = analyzer.monte_carlo(
            &SensitivityParams::default(),
            &distributions(),
            5_000,
            7,
        );
        for window in stats.percentiles.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
        assert!(stats.ci_90.0 <= stats.ci_80.0);
        assert!(stats.ci_80.1 <= stats.ci_90.1);
        assert!(stats.valid_simulations > 4_000);
    }
}
