//! Floating-point descriptive statistics shared by the return, risk and
//! simulation modules.

use std::cmp::Ordering;

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n − 1 denominator). Returns `None` for fewer than 2 values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Sample standard deviation (n − 1 denominator).
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Sample covariance of two equal-length slices.
pub fn sample_covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let s: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Some(s / (a.len() - 1) as f64)
}

/// Sort ascending; NaNs compare equal so they never panic the sort.
pub fn sort_ascending(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Percentile of a **sorted** slice using linear interpolation between
/// order statistics. `p` is in percent (0–100).
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        Some(sorted[lower])
    } else {
        let frac = rank - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
    }
}

/// Maximum drawdown of a compounded return series and its duration in periods.
pub fn max_drawdown_with_duration(returns: &[f64]) -> (f64, u32) {
    let mut cumulative = 1.0;
    let mut peak = 1.0;
    let mut peak_idx = 0usize;
    let mut max_dd = 0.0;
    let mut start = 0usize;
    let mut end = 0usize;

    for (i, r) in returns.iter().enumerate() {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
            peak_idx = i + 1;
        }
        if peak > 0.0 {
            let dd = (peak - cumulative) / peak;
            if dd > max_dd {
                max_dd = dd;
                start = peak_idx;
                end = i + 1;
            }
        }
    }

    (max_dd, end.saturating_sub(start) as u32)
}

/// Maximum drawdown of a level series (prices or portfolio values).
pub fn max_drawdown_of_levels(levels: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0;
    for &v in levels {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&v), Some(2.5));
        let var = sample_variance(&v).unwrap();
        assert!((var - 5.0 / 3.0).abs() < 1e-12);
        assert!(sample_variance(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&v, 50.0), Some(3.0));
        assert_eq!(percentile_sorted(&v, 0.0), Some(1.0));
        assert_eq!(percentile_sorted(&v, 100.0), Some(5.0));
        // rank = 0.1 * 4 = 0.4 -> 1.4
        let p10 = percentile_sorted(&v, 10.0).unwrap();
        assert!((p10 - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_matches_variance() {
        let v = [0.01, -0.02, 0.03, 0.005];
        let cov = sample_covariance(&v, &v).unwrap();
        assert!((cov - sample_variance(&v).unwrap()).abs() < 1e-15);
    }

    #[test]
    fn test_max_drawdown() {
        let (dd, duration) = max_drawdown_with_duration(&[0.10, -0.20, 0.05, -0.15]);
        // Peak 1.10, trough 1.10*0.8*1.05*0.85 = 0.7854
        assert!((dd - (1.10 - 0.7854) / 1.10).abs() < 1e-12);
        assert_eq!(duration, 3);
    }

    #[test]
    fn test_max_drawdown_of_levels() {
        let dd = max_drawdown_of_levels(&[100.0, 120.0, 90.0, 130.0]);
        assert!((dd - 0.25).abs() < 1e-12);
    }
}
