use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantError;
use crate::stats;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::QuantResult;

use super::series::ReturnFrequency;

fn default_vol_window() -> usize {
    30
}

fn default_beta_window() -> usize {
    60
}

/// Input for portfolio performance analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInput {
    /// Periodic portfolio returns (as decimals)
    pub returns: Vec<f64>,
    /// Market / benchmark returns on the same dates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_returns: Option<Vec<f64>>,
    /// Annual risk-free rate
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    /// Window for rolling annualised volatility
    #[serde(default = "default_vol_window")]
    pub volatility_window: usize,
    /// Window for rolling beta
    #[serde(default = "default_beta_window")]
    pub beta_window: usize,
}

/// Output of portfolio performance analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceOutput {
    pub observations: usize,
    pub annualised_return: f64,
    pub annualised_volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_duration: u32,
    pub beta: Option<f64>,
    pub market_annualised_volatility: Option<f64>,
    /// Rolling annualised volatility, one value per full window
    pub rolling_volatility: Vec<f64>,
    /// Rolling beta, one entry per full window (empty without a market series);
    /// `None` where the market is flat over the window
    pub rolling_beta: Vec<Option<f64>>,
}

/// Beta of an asset against the market: Cov(r_a, r_m) / Var(r_m).
///
/// A market series with zero variance is a `DegenerateAsset` error; no
/// default beta is substituted.
pub fn estimate_beta(asset_returns: &[f64], market_returns: &[f64]) -> QuantResult<f64> {
    if asset_returns.len() != market_returns.len() {
        return Err(QuantError::InvalidInput {
            field: "market_returns".into(),
            reason: format!(
                "Market series has {} observations, asset has {}",
                market_returns.len(),
                asset_returns.len()
            ),
        });
    }
    let (cov, var) = match (
        stats::sample_covariance(asset_returns, market_returns),
        stats::sample_variance(market_returns),
    ) {
        (Some(c), Some(v)) => (c, v),
        _ => {
            return Err(QuantError::InsufficientData(
                "At least 2 paired observations required for beta".into(),
            ))
        }
    };
    if var <= f64::EPSILON * f64::EPSILON {
        return Err(QuantError::DegenerateAsset {
            asset: "market".into(),
        });
    }
    Ok(cov / var)
}

/// Rolling annualised volatility over a fixed window.
pub fn rolling_volatility(returns: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    if window < 2 || returns.len() < window {
        return Vec::new();
    }
    returns
        .windows(window)
        .filter_map(stats::sample_std_dev)
        .map(|s| s * periods_per_year.sqrt())
        .collect()
}

/// Rolling beta over a fixed window, aligned with `windows(window)`.
///
/// Windows where the market has zero variance yield `None`.
pub fn rolling_beta(asset_returns: &[f64], market_returns: &[f64], window: usize) -> Vec<Option<f64>> {
    if window < 2 || asset_returns.len() < window || asset_returns.len() != market_returns.len() {
        return Vec::new();
    }
    asset_returns
        .windows(window)
        .zip(market_returns.windows(window))
        .map(|(a, m)| estimate_beta(a, m).ok())
        .collect()
}

/// Calculate annualised return/volatility, Sharpe, drawdown and beta.
pub fn calculate_performance(
    input: &PerformanceInput,
) -> QuantResult<ComputationOutput<PerformanceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.returns.len();
    if n < 2 {
        return Err(QuantError::InsufficientData(
            "At least 2 return observations required".into(),
        ));
    }
    if input.returns.iter().any(|r| !r.is_finite()) {
        return Err(QuantError::InvalidInput {
            field: "returns".into(),
            reason: "Returns must be finite".into(),
        });
    }

    let periods = input.frequency.periods_per_year();
    let mean = stats::mean(&input.returns).unwrap_or_default();
    let std_dev = stats::sample_std_dev(&input.returns).unwrap_or_default();

    let annualised_return = mean * periods;
    let annualised_volatility = std_dev * periods.sqrt();

    // Sharpe is undefined for a flat series
    let sharpe_ratio = if annualised_volatility > 0.0 {
        Some((annualised_return - input.risk_free_rate) / annualised_volatility)
    } else {
        warnings.push("Zero volatility: Sharpe ratio undefined".into());
        None
    };

    let (max_drawdown, max_drawdown_duration) = stats::max_drawdown_with_duration(&input.returns);

    let (beta, market_annualised_volatility, rolling_beta) = match input.market_returns {
        Some(ref market) => {
            if market.iter().any(|r| !r.is_finite()) {
                return Err(QuantError::InvalidInput {
                    field: "market_returns".into(),
                    reason: "Market returns must be finite".into(),
                });
            }
            let beta = estimate_beta(&input.returns, market)?;
            let mkt_vol = stats::sample_std_dev(market).map(|s| s * periods.sqrt());
            let rb = rolling_beta(&input.returns, market, input.beta_window);
            let flat = rb.iter().filter(|b| b.is_none()).count();
            if rb.is_empty() {
                warnings.push(format!(
                    "Rolling beta window ({}) exceeds available observations ({n})",
                    input.beta_window
                ));
            } else if flat > 0 {
                warnings.push(format!(
                    "Rolling beta undefined in {flat} of {} windows: market returns are flat",
                    rb.len()
                ));
            }
            (Some(beta), mkt_vol, rb)
        }
        None => (None, None, Vec::new()),
    };

    let rolling_volatility = rolling_volatility(&input.returns, input.volatility_window, periods);

    let output = PerformanceOutput {
        observations: n,
        annualised_return,
        annualised_volatility,
        sharpe_ratio,
        max_drawdown,
        max_drawdown_duration,
        beta,
        market_annualised_volatility,
        rolling_volatility,
        rolling_beta,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Performance analytics (Sharpe, drawdown, beta, rolling risk)",
        &serde_json::json!({
            "observations": n,
            "frequency": input.frequency,
            "risk_free_rate": input.risk_free_rate,
            "volatility_window": input.volatility_window,
            "beta_window": input.beta_window,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        vec![
            0.05, -0.02, 0.03, 0.01, -0.01, 0.04, 0.02, -0.03, 0.06, 0.01, -0.02, 0.03,
        ]
    }

    #[test]
    fn test_beta_of_scaled_series() {
        let market = sample_returns();
        let asset: Vec<f64> = market.iter().map(|r| 1.5 * r + 0.001).collect();
        let beta = estimate_beta(&asset, &market).unwrap();
        assert!((beta - 1.5).abs() < 1e-12, "beta {beta}");
    }

    #[test]
    fn test_flat_market_is_degenerate() {
        let market = vec![0.01; 10];
        let asset = sample_returns()[..10].to_vec();
        assert!(matches!(
            estimate_beta(&asset, &market),
            Err(QuantError::DegenerateAsset { .. })
        ));
    }

    #[test]
    fn test_performance_with_market() {
        let market = sample_returns();
        let portfolio: Vec<f64> = market.iter().map(|r| 0.8 * r).collect();
        let input = PerformanceInput {
            returns: portfolio,
            market_returns: Some(market),
            risk_free_rate: 0.03,
            frequency: ReturnFrequency::Monthly,
            volatility_window: 6,
            beta_window: 6,
        };
        let out = calculate_performance(&input).unwrap().result;
        assert!((out.beta.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(out.rolling_volatility.len(), 7);
        assert_eq!(out.rolling_beta.len(), 7);
        assert!(out
            .rolling_beta
            .iter()
            .all(|b| (b.unwrap() - 0.8).abs() < 1e-9));
        assert!(out.sharpe_ratio.is_some());
        assert!(out.max_drawdown > 0.0);
    }

    #[test]
    fn test_flat_market_windows_stay_aligned() {
        // First 4 market returns are flat, so window 0 of 9 has no beta
        let mut market = sample_returns();
        for r in market.iter_mut().take(4) {
            *r = 0.01;
        }
        let portfolio: Vec<f64> = market.iter().map(|r| 1.2 * r).collect();
        let input = PerformanceInput {
            returns: portfolio,
            market_returns: Some(market),
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Monthly,
            volatility_window: 4,
            beta_window: 4,
        };
        let out = calculate_performance(&input).unwrap();
        let rb = &out.result.rolling_beta;
        assert_eq!(rb.len(), 9);
        assert_eq!(rb[0], None);
        assert!(rb[1].is_some());
        assert!(rb[1..].iter().all(|b| (b.unwrap() - 1.2).abs() < 1e-9));
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("1 of 9 windows")), "{:?}", out.warnings);
    }

    #[test]
    fn test_non_finite_market_rejected() {
        let mut market = sample_returns();
        market[3] = f64::NAN;
        let input = PerformanceInput {
            returns: sample_returns(),
            market_returns: Some(market),
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Monthly,
            volatility_window: 6,
            beta_window: 6,
        };
        assert!(matches!(
            calculate_performance(&input),
            Err(QuantError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_flat_series_has_no_sharpe() {
        let input = PerformanceInput {
            returns: vec![0.01; 5],
            market_returns: None,
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Daily,
            volatility_window: 30,
            beta_window: 60,
        };
        let out = calculate_performance(&input).unwrap();
        assert!(out.result.sharpe_ratio.is_none());
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_insufficient_data() {
        let input = PerformanceInput {
            returns: vec![0.01],
            market_returns: None,
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Daily,
            volatility_window: 30,
            beta_window: 60,
        };
        assert!(calculate_performance(&input).is_err());
    }
}
