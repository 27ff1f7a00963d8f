//! Statistical trend extraction for financial metric series.
//!
//! Fits an OLS regression on index vs value and classifies the direction
//! from the annualised relative slope and its significance. Also reports
//! CAGR, residual anomalies, seasonality and moving-average crossovers.

use serde::{Deserialize, Serialize};

use valuation_core::error::{EngineError, EngineResult};
use valuation_core::stats;
use valuation_core::types::{MovingAverages, Seasonality, TrendDirection, TrendMetrics};

/// Sampling cadence of the series; sets the annualisation factor and the
/// seasonality lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesFrequency {
    Annual,
    Quarterly,
    Monthly,
    Daily,
}

impl SeriesFrequency {
    fn periods_per_year(&self) -> f64 {
        match self {
            SeriesFrequency::Annual => 1.0,
            SeriesFrequency::Quarterly => 4.0,
            SeriesFrequency::Monthly => 12.0,
            SeriesFrequency::Daily => 252.0,
        }
    }

    fn seasonality_lag(&self) -> Option<usize> {
        match self {
            SeriesFrequency::Quarterly => Some(4),
            SeriesFrequency::Monthly => Some(12),
            _ => None,
        }
    }
}

/// Relative slope above which a significant trend is "strong".
const STRONG_RELATIVE_SLOPE: f64 = 0.15;
/// p-value below which a slope counts as significant.
const SIGNIFICANCE_LEVEL: f64 = 0.05;
/// p-value at or above which the series is treated as stable.
const STABLE_P_VALUE: f64 = 0.10;
/// Series-relative slope floor below which movement is noise.
const SLOPE_FLOOR_FRACTION: f64 = 0.02;
/// Residual z-score beyond which a point is an anomaly.
const ANOMALY_Z: f64 = 2.5;
/// Autocorrelation above which seasonality is flagged.
const SEASONALITY_THRESHOLD: f64 = 0.5;

pub struct TrendAnalyzer;

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one metric series, oldest first. Requires at least 3 points.
    pub fn analyze(
        &self,
        metric: &str,
        values: &[f64],
        frequency: SeriesFrequency,
    ) -> EngineResult<TrendMetrics> {
        if values.len() < 3 {
            return Err(EngineError::InsufficientData(format!(
                "trend for {metric} needs at least 3 points, got {}",
                values.len()
            )));
        }

        let fit = stats::ols(values).ok_or_else(|| {
            EngineError::InsufficientData(format!("degenerate series for {metric}"))
        })?;

        let series_mean = stats::mean(values);
        let annualised_slope = fit.slope * frequency.periods_per_year();
        let relative_slope = if series_mean.abs() > f64::EPSILON {
            annualised_slope / series_mean
        } else {
            0.0
        };

        let direction = classify(fit.p_value, fit.slope, relative_slope);
        let significant = fit.p_value < SIGNIFICANCE_LEVEL;

        let cagr = cagr(values, frequency);
        let anomaly_indices = anomalies(values, &fit);
        let moving_averages = moving_averages(values, frequency);
        let seasonality = frequency
            .seasonality_lag()
            .and_then(|lag| seasonality(values, lag));

        Ok(TrendMetrics {
            metric: metric.to_string(),
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            p_value: fit.p_value,
            cagr,
            direction,
            significant,
            anomaly_indices,
            moving_averages,
            seasonality,
        })
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(p_value: f64, slope: f64, relative_slope: f64) -> TrendDirection {
    // Insignificant, or annualised movement under the series-relative floor:
    // stable.
    if p_value >= STABLE_P_VALUE || relative_slope.abs() < SLOPE_FLOOR_FRACTION {
        return TrendDirection::Stable;
    }

    let strong = relative_slope.abs() > STRONG_RELATIVE_SLOPE && p_value < SIGNIFICANCE_LEVEL;
    match (slope > 0.0, strong) {
        (true, true) => TrendDirection::StrongImproving,
        (true, false) => TrendDirection::Improving,
        (false, true) => TrendDirection::StrongDeclining,
        (false, false) => TrendDirection::Declining,
    }
}

/// CAGR over the whole series; defined only when the endpoints share sign
/// and are non-zero.
fn cagr(values: &[f64], frequency: SeriesFrequency) -> Option<f64> {
    let first = *values.first()?;
    let last = *values.last()?;
    if first == 0.0 || last == 0.0 || first.signum() != last.signum() {
        return None;
    }
    let years = (values.len() - 1) as f64 / frequency.periods_per_year();
    if years <= 0.0 {
        return None;
    }
    Some((last / first).abs().powf(1.0 / years) - 1.0)
}

/// Indices whose regression residual has |z| beyond the threshold.
fn anomalies(values: &[f64], fit: &stats::OlsFit) -> Vec<usize> {
    let residuals = stats::ols_residuals(values, fit);
    let sd = stats::std_dev(&residuals);
    if sd <= f64::EPSILON {
        return Vec::new();
    }
    let m = stats::mean(&residuals);
    residuals
        .iter()
        .enumerate()
        .filter(|(_, r)| ((*r - m) / sd).abs() > ANOMALY_Z)
        .map(|(i, _)| i)
        .collect()
}

fn seasonality(values: &[f64], lag: usize) -> Option<Seasonality> {
    let autocorrelation = stats::autocorrelation(values, lag)?;
    Some(Seasonality {
        lag,
        autocorrelation,
        flagged: autocorrelation > SEASONALITY_THRESHOLD,
    })
}

/// Simple moving average of the trailing `period` points.
fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Exponential moving average over the whole series, seeded with the SMA of
/// the first `period` points.
fn ema_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
    }
    Some(ema)
}

fn moving_averages(values: &[f64], frequency: SeriesFrequency) -> MovingAverages {
    let mut out = MovingAverages {
        sma_3: sma_last(values, 3),
        sma_5: sma_last(values, 5),
        ema_3: ema_last(values, 3),
        ema_5: ema_last(values, 5),
        ..Default::default()
    };

    if frequency == SeriesFrequency::Daily {
        out.sma_50 = sma_last(values, 50);
        out.sma_200 = sma_last(values, 200);
        let (golden, death) = detect_cross(values, 50, 200);
        out.golden_cross = golden;
        out.death_cross = death;
    }

    out
}

/// Golden/death cross of the short SMA over the long SMA, requiring the
/// crossing to hold on the following point as confirmation.
fn detect_cross(values: &[f64], short: usize, long: usize) -> (bool, bool) {
    if values.len() < long + 2 {
        return (false, false);
    }

    let diff_at = |end: usize| -> Option<f64> {
        let window = &values[..end];
        Some(sma_last(window, short)? - sma_last(window, long)?)
    };

    // Cross at n-1, confirmed at n.
    let before = match diff_at(values.len() - 2) {
        Some(d) => d,
        None => return (false, false),
    };
    let at_cross = match diff_at(values.len() - 1) {
        Some(d) => d,
        None => return (false, false),
    };
    let confirm = match diff_at(values.len()) {
        Some(d) => d,
        None => return (false, false),
    };

    let golden = before <= 0.0 && at_cross > 0.0 && confirm > 0.0;
    let death = before >= 0.0 && at_cross < 0.0 && confirm < 0.0;
    (golden, death)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_series() {
        let analyzer = TrendAnalyzer::new();
        let err = analyzer
            .analyze("revenue", &[1.0, 2.0], SeriesFrequency::Quarterly)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn test_strong_improving_revenue() {
        // ~8% per quarter on a clean ramp: strongly improving.
        let values: Vec<f64> = (0..12).map(|i| 100.0 * 1.08f64.powi(i)).collect();
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("revenue", &values, SeriesFrequency::Quarterly)
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::StrongImproving);
        assert!(trend.significant);
        let cagr = trend.cagr.unwrap();
        assert!(cagr > 0.25, "quarterly 8% compounds well past 25%/yr, got {cagr}");
    }

    #[test]
    fn test_stable_series() {
        let values = vec![50.0, 50.2, 49.9, 50.1, 49.8, 50.0, 50.1, 49.9];
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("net_margin", &values, SeriesFrequency::Quarterly)
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_declining_series() {
        let values: Vec<f64> = (0..12).map(|i| 100.0 * 0.93f64.powi(i)).collect();
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("revenue", &values, SeriesFrequency::Quarterly)
            .unwrap();
        assert!(matches!(
            trend.direction,
            TrendDirection::Declining | TrendDirection::StrongDeclining
        ));
        assert!(trend.slope < 0.0);
    }

    #[test]
    fn test_cagr_undefined_on_sign_change() {
        let values = vec![-10.0, 5.0, 12.0, 20.0];
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("net_income", &values, SeriesFrequency::Annual)
            .unwrap();
        assert!(trend.cagr.is_none());
    }

    #[test]
    fn test_anomaly_detection() {
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        values[10] = 400.0; // one wild print
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("revenue", &values, SeriesFrequency::Quarterly)
            .unwrap();
        assert!(trend.anomaly_indices.contains(&10));
    }

    #[test]
    fn test_seasonality_flagged_for_periodic_quarters() {
        let values: Vec<f64> = (0..24)
            .map(|i| [100.0, 60.0, 80.0, 140.0][i % 4] + i as f64 * 0.1)
            .collect();
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("revenue", &values, SeriesFrequency::Quarterly)
            .unwrap();
        let seasonality = trend.seasonality.unwrap();
        assert_eq!(seasonality.lag, 4);
        assert!(seasonality.flagged);
    }

    #[test]
    fn test_golden_cross_confirmed() {
        // Long decline then a sharp sustained recovery: the 50-SMA crosses
        // above the 200-SMA near the end.
        let mut values: Vec<f64> = (0..260).map(|i| 300.0 - i as f64).collect();
        values.extend((0..80).map(|i| 40.0 + i as f64 * 6.0));
        let analyzer = TrendAnalyzer::new();
        let trend = analyzer
            .analyze("close", &values, SeriesFrequency::Daily)
            .unwrap();
        assert!(trend.moving_averages.sma_50.is_some());
        assert!(trend.moving_averages.sma_200.is_some());
        // A cross this deep in the recovery has already happened; the flags
        // only fire in the two-point confirmation window, so just assert the
        // short average is above the long one.
        assert!(
            trend.moving_averages.sma_50.unwrap() > trend.moving_averages.sma_200.unwrap()
        );
    }
}
