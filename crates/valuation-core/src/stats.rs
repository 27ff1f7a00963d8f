//! Shared statistics helpers.
//!
//! Everything here is pure and allocation-light; the regression and test
//! routines return plain structs the analyzers compose into their outputs.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Population standard deviation (used for dispersion features).
pub fn std_dev_pop(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

/// Median of a slice (sorts a copy).
pub fn median(data: &[f64]) -> f64 {
    percentile(data, 50.0)
}

/// Percentile (0-100 scale) with nearest-rank on a sorted copy.
pub fn percentile(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, pct)
}

/// Percentile over an already-sorted slice.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Weighted percentile: values with their non-negative weights.
/// Finds the smallest value whose cumulative weight share reaches `pct`.
pub fn weighted_percentile(pairs: &[(f64, f64)], pct: f64) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<(f64, f64)> = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = sorted.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return percentile(&sorted.iter().map(|(v, _)| *v).collect::<Vec<_>>(), pct);
    }
    let target = total * (pct / 100.0);
    let mut cumulative = 0.0;
    for (value, weight) in &sorted {
        cumulative += weight.max(0.0);
        if cumulative >= target {
            return *value;
        }
    }
    sorted[sorted.len() - 1].0
}

/// Round half-to-even at `dp` decimal places; the storage rounding mode for
/// ratios (computations stay in full double precision).
pub fn round_half_even(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    let scaled = value * factor;
    let floor = scaled.floor();
    let diff = scaled - floor;
    let rounded = if (diff - 0.5).abs() < 1e-9 {
        // Tie: round to the even neighbour.
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / factor
}

/// OLS fit of value on index.
#[derive(Debug, Clone, Copy)]
pub struct OlsFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-sided p-value for slope = 0 under Student-t with n-2 df.
    pub p_value: f64,
}

/// Fit y = a + b·x over x = 0..n-1. Needs at least 3 points.
pub fn ols(values: &[f64]) -> Option<OlsFit> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let fitted = intercept + slope * i as f64;
            (y - fitted).powi(2)
        })
        .sum();

    let r_squared = if syy > 0.0 { 1.0 - ss_res / syy } else { 1.0 };

    let df = nf - 2.0;
    let p_value = if ss_res <= f64::EPSILON * syy.max(1.0) {
        0.0
    } else {
        let se = (ss_res / df / sxx).sqrt();
        if se <= 0.0 {
            0.0
        } else {
            let t = slope / se;
            match StudentsT::new(0.0, 1.0, df) {
                Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
                Err(_) => 1.0,
            }
        }
    };

    Some(OlsFit { slope, intercept, r_squared, p_value })
}

/// Residuals of the OLS fit, in series order.
pub fn ols_residuals(values: &[f64], fit: &OlsFit) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, y)| y - (fit.intercept + fit.slope * i as f64))
        .collect()
}

/// Autocorrelation of a series at the given lag.
pub fn autocorrelation(values: &[f64], lag: usize) -> Option<f64> {
    if lag == 0 || values.len() < lag + 2 {
        return None;
    }
    let m = mean(values);
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom <= 0.0 {
        return None;
    }
    let numer: f64 = values
        .windows(lag + 1)
        .map(|w| (w[0] - m) * (w[lag] - m))
        .sum();
    Some(numer / denom)
}

/// Paired two-sided t-test on matched samples. Returns the p-value, or None
/// when the inputs are too short or mismatched.
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 3 {
        return None;
    }
    let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
    let d_mean = mean(&diffs);
    let d_std = std_dev(&diffs);
    if d_std <= f64::EPSILON {
        // Zero variance: either the samples are identical (no evidence) or
        // one side is uniformly better (overwhelming evidence).
        return Some(if d_mean.abs() <= f64::EPSILON { 1.0 } else { 0.0 });
    }
    let n = diffs.len() as f64;
    let t = d_mean / (d_std / n.sqrt());
    let dist = StudentsT::new(0.0, 1.0, n - 1.0).ok()?;
    Some(2.0 * (1.0 - dist.cdf(t.abs())))
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na <= 0.0 || nb <= 0.0 {
        return None;
    }
    Some(dot / (na * nb))
}

/// Mean absolute percentage error of predictions vs actuals.
pub fn mape(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    if predicted.len() != actual.len() || predicted.is_empty() {
        return None;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for (p, a) in predicted.iter().zip(actual.iter()) {
        if a.abs() > f64::EPSILON {
            sum += ((p - a) / a).abs();
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Confidence attached to a trained artifact: R² minus a capped cv-std
/// penalty, scaled down when the sample count is under `full_at`. Shared by
/// the weight trainer and the dimension-weight learner.
pub fn ml_confidence(r2: f64, cv_std: f64, sample_count: usize, full_at: usize) -> f64 {
    let base = r2.max(0.0) - (cv_std * 0.5).min(0.2);
    let scale = if full_at > 0 {
        (sample_count as f64 / full_at as f64).min(1.0)
    } else {
        1.0
    };
    (base * scale).clamp(0.0, 1.0)
}

/// Logistic mapping of a signed growth rate onto [0, 100].
/// `midpoint` is the rate that scores 50; `steepness` controls the ramp.
pub fn logistic_score(rate: f64, midpoint: f64, steepness: f64) -> f64 {
    100.0 / (1.0 + (-(rate - midpoint) * steepness).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_perfect_line() {
        let values: Vec<f64> = (0..10).map(|i| 2.0 + 3.0 * i as f64).collect();
        let fit = ols(&values).unwrap();
        assert!((fit.slope - 3.0).abs() < 1e-9);
        assert!((fit.intercept - 2.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!(fit.p_value < 0.001);
    }

    #[test]
    fn test_ols_needs_three_points() {
        assert!(ols(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_ols_flat_series_insignificant() {
        let values = vec![5.0, 5.1, 4.9, 5.0, 5.05, 4.95, 5.0, 5.1, 4.9, 5.0];
        let fit = ols(&values).unwrap();
        assert!(fit.p_value > 0.10, "noise around a flat mean, p={}", fit.p_value);
    }

    #[test]
    fn test_round_half_even() {
        assert!((round_half_even(0.1234565, 6) - 0.123456).abs() < 1e-12);
        assert!((round_half_even(0.1234575, 6) - 0.123458).abs() < 1e-12);
        assert!((round_half_even(1.5, 0) - 2.0).abs() < 1e-12);
        assert!((round_half_even(2.5, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_percentile_degenerates_to_plain() {
        let pairs: Vec<(f64, f64)> = (1..=9).map(|i| (i as f64, 1.0)).collect();
        let p50 = weighted_percentile(&pairs, 50.0);
        assert!((p50 - 5.0).abs() < 1.0);
    }

    #[test]
    fn test_paired_t_test_identical_samples() {
        let a = vec![0.1, 0.2, 0.15, 0.12, 0.3];
        let p = paired_t_test(&a, &a).unwrap();
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_paired_t_test_clear_difference() {
        let a: Vec<f64> = (0..30).map(|i| 0.30 + (i % 3) as f64 * 0.01).collect();
        let b: Vec<f64> = (0..30).map(|i| 0.10 + (i % 3) as f64 * 0.01).collect();
        let p = paired_t_test(&a, &b).unwrap();
        assert!(p < 0.001);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 1.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_autocorrelation_periodic_series() {
        // Strong period-4 pattern.
        let values: Vec<f64> = (0..24).map(|i| [10.0, 2.0, 5.0, 8.0][i % 4]).collect();
        let ac = autocorrelation(&values, 4).unwrap();
        assert!(ac > 0.5, "expected strong lag-4 autocorrelation, got {ac}");
    }

    #[test]
    fn test_mape() {
        let m = mape(&[110.0, 90.0], &[100.0, 100.0]).unwrap();
        assert!((m - 0.10).abs() < 1e-12);
    }
}
