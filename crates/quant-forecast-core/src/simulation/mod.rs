pub mod gbm;
pub mod portfolio;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::correlation::CorrelationMatrix;
use crate::error::QuantError;
use crate::risk::var::{estimate_with, validate_confidence};
use crate::risk::{RiskEstimate, RiskMethod};
use crate::stats;
use crate::types::{validate_weights, with_metadata_f64, ComputationOutput};
use crate::QuantResult;

pub use gbm::{correlated_normals, simulate_paths, GbmSpec, SimulationPaths};
pub use portfolio::{path_drawdowns, portfolio_terminal_returns};

fn default_sample_paths() -> usize {
    30
}

fn default_mc_draws() -> usize {
    10_000
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for a correlated multi-asset price simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub assets: Vec<String>,
    pub initial_prices: Vec<f64>,
    /// Annualised drifts
    pub drifts: Vec<f64>,
    /// Annualised volatilities
    pub volatilities: Vec<f64>,
    pub correlation: CorrelationMatrix,
    /// Steps to simulate
    pub horizon: usize,
    pub scenarios: usize,
    #[serde(default = "gbm::default_dt")]
    pub dt: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Portfolio weights for the aggregate distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Confidence level for forward-looking VaR / ES
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
    /// Number of full paths to return per asset
    #[serde(default = "default_sample_paths")]
    pub sample_paths: usize,
    #[serde(default = "default_mc_draws")]
    pub mc_draws: usize,
}

impl SimulationInput {
    pub fn gbm_spec(&self) -> GbmSpec {
        GbmSpec {
            initial_prices: self.initial_prices.clone(),
            drifts: self.drifts.clone(),
            volatilities: self.volatilities.clone(),
            correlation: self.correlation.clone(),
            horizon: self.horizon,
            scenarios: self.scenarios,
            dt: self.dt,
            seed: self.seed,
        }
    }
}

/// P10 / P50 / P90 of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

impl PercentileBand {
    fn from_sorted(sorted: &[f64]) -> Self {
        let pct = |p| stats::percentile_sorted(sorted, p).unwrap_or(f64::NAN);
        Self {
            p10: pct(10.0),
            p50: pct(50.0),
            p90: pct(90.0),
        }
    }

    fn from_values(mut values: Vec<f64>) -> Self {
        stats::sort_ascending(&mut values);
        Self::from_sorted(&values)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetForecast {
    pub asset: String,
    pub initial_price: f64,
    pub terminal_mean: f64,
    pub terminal_median: f64,
    pub terminal_std_dev: f64,
    pub terminal_price: PercentileBand,
    pub terminal_return: PercentileBand,
    /// Percentile band per step, index 0 is the initial price
    pub bands: Vec<PercentileBand>,
    pub sample_paths: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub band: PercentileBand,
}

impl DistributionSummary {
    fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        stats::sort_ascending(&mut sorted);
        Self {
            mean: stats::mean(values).unwrap_or(f64::NAN),
            std_dev: stats::sample_std_dev(values).unwrap_or(0.0),
            min: sorted.first().copied().unwrap_or(f64::NAN),
            max: sorted.last().copied().unwrap_or(f64::NAN),
            band: PercentileBand::from_sorted(&sorted),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioForecast {
    pub weights: Vec<f64>,
    pub terminal_return: DistributionSummary,
    pub probability_of_loss: f64,
    pub max_drawdown: DistributionSummary,
    /// Forward VaR / ES on the simulated terminal returns
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub risk: Vec<RiskEstimate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub assets: Vec<String>,
    pub initial_prices: Vec<f64>,
    pub horizon: usize,
    pub scenarios: usize,
    pub forecasts: Vec<AssetForecast>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<PortfolioForecast>,
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

fn asset_forecast(
    paths: &SimulationPaths,
    asset: usize,
    name: &str,
    sample_paths: usize,
) -> AssetForecast {
    let s0 = paths.initial(0, asset);
    let mut terminal = paths.cross_section(paths.horizon(), asset);
    let terminal_mean = stats::mean(&terminal).unwrap_or(s0);
    let terminal_std_dev = stats::sample_std_dev(&terminal).unwrap_or(0.0);
    stats::sort_ascending(&mut terminal);
    let terminal_price = PercentileBand::from_sorted(&terminal);
    let terminal_return = PercentileBand {
        p10: terminal_price.p10 / s0 - 1.0,
        p50: terminal_price.p50 / s0 - 1.0,
        p90: terminal_price.p90 / s0 - 1.0,
    };

    let bands = (0..=paths.horizon())
        .into_par_iter()
        .map(|t| PercentileBand::from_values(paths.cross_section(t, asset)))
        .collect();

    let sample_paths = (0..sample_paths.min(paths.scenarios()))
        .map(|s| paths.path(s, asset))
        .collect();

    AssetForecast {
        asset: name.to_string(),
        initial_price: s0,
        terminal_mean,
        terminal_median: terminal_price.p50,
        terminal_std_dev,
        terminal_price,
        terminal_return,
        bands,
        sample_paths,
    }
}

fn portfolio_forecast(
    paths: &SimulationPaths,
    input: &SimulationInput,
    weights: &[f64],
    warnings: &mut Vec<String>,
) -> QuantResult<PortfolioForecast> {
    let terminal = portfolio_terminal_returns(paths, weights)?;
    let drawdowns = path_drawdowns(paths, weights)?;
    let losses = terminal.iter().filter(|r| **r < 0.0).count();

    let risk = match input.confidence_level {
        Some(alpha) if terminal.len() >= 2 => RiskMethod::ALL
            .iter()
            .map(|&m| estimate_with(m, &terminal, alpha, input.mc_draws, input.seed))
            .collect::<QuantResult<Vec<_>>>()?,
        Some(_) => {
            warnings.push("Forward VaR/ES needs at least 2 scenarios; skipped".into());
            Vec::new()
        }
        None => Vec::new(),
    };

    Ok(PortfolioForecast {
        weights: weights.to_vec(),
        terminal_return: DistributionSummary::from_values(&terminal),
        probability_of_loss: losses as f64 / terminal.len() as f64,
        max_drawdown: DistributionSummary::from_values(&drawdowns),
        risk,
    })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Simulate correlated GBM paths and summarise them per asset and for the
/// weighted portfolio.
pub fn run_simulation(input: &SimulationInput) -> QuantResult<ComputationOutput<SimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.assets.len() != input.initial_prices.len() {
        return Err(QuantError::InvalidInput {
            field: "assets".into(),
            reason: format!(
                "{} asset names for {} initial prices",
                input.assets.len(),
                input.initial_prices.len()
            ),
        });
    }
    if let Some(ref w) = input.weights {
        validate_weights(w, input.assets.len())?;
    }
    if let Some(alpha) = input.confidence_level {
        validate_confidence(alpha)?;
    }

    let paths = simulate_paths(&input.gbm_spec())?;

    let (forecasts, portfolio) = if input.horizon == 0 {
        warnings.push("Horizon is 0: initial prices only, no projected distribution".into());
        (Vec::new(), None)
    } else {
        let forecasts = input
            .assets
            .iter()
            .enumerate()
            .map(|(a, name)| asset_forecast(&paths, a, name, input.sample_paths))
            .collect();
        let portfolio = match input.weights {
            Some(ref w) => Some(portfolio_forecast(&paths, input, w, &mut warnings)?),
            None => None,
        };
        (forecasts, portfolio)
    };

    if input.scenarios < 1_000 && input.horizon > 0 {
        warnings.push(format!(
            "Only {} scenarios: percentile bands are noisy",
            input.scenarios
        ));
    }

    let output = SimulationOutput {
        assets: input.assets.clone(),
        initial_prices: input.initial_prices.clone(),
        horizon: input.horizon,
        scenarios: input.scenarios,
        forecasts,
        portfolio,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Correlated geometric Brownian motion (Cholesky factorised normals)",
        &serde_json::json!({
            "assets": input.assets,
            "horizon_steps": input.horizon,
            "scenarios": input.scenarios,
            "dt": input.dt,
            "seed": input.seed,
            "batch_size": gbm::BATCH_SIZE,
            "confidence_level": input.confidence_level,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SimulationInput {
        SimulationInput {
            assets: vec!["AAA".into(), "BBB".into()],
            initial_prices: vec![100.0, 40.0],
            drifts: vec![0.07, 0.12],
            volatilities: vec![0.18, 0.35],
            correlation: CorrelationMatrix::new(vec![vec![1.0, 0.3], vec![0.3, 1.0]]).unwrap(),
            horizon: 63,
            scenarios: 2_000,
            dt: 1.0 / 252.0,
            seed: Some(42),
            weights: Some(vec![0.6, 0.4]),
            confidence_level: Some(0.95),
            sample_paths: 30,
            mc_draws: 10_000,
        }
    }

    #[test]
    fn test_forecast_summary() {
        let out = run_simulation(&input()).unwrap().result;
        assert_eq!(out.forecasts.len(), 2);
        let f = &out.forecasts[0];
        assert_eq!(f.bands.len(), 64);
        assert_eq!(f.sample_paths.len(), 30);
        assert_eq!(f.bands[0].p10, 100.0);
        assert!(f.terminal_price.p10 < f.terminal_price.p50);
        assert!(f.terminal_price.p50 < f.terminal_price.p90);
        assert!((f.terminal_return.p50 - (f.terminal_median / 100.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_portfolio_forward_risk() {
        let out = run_simulation(&input()).unwrap().result;
        let p = out.portfolio.unwrap();
        assert_eq!(p.risk.len(), 3);
        for r in &p.risk {
            assert!(r.es <= r.var);
        }
        assert!((0.0..=1.0).contains(&p.probability_of_loss));
        assert!(p.max_drawdown.mean > 0.0);
    }

    #[test]
    fn test_zero_horizon() {
        let mut inp = input();
        inp.horizon = 0;
        let out = run_simulation(&inp).unwrap();
        assert!(out.result.forecasts.is_empty());
        assert!(out.result.portfolio.is_none());
        assert_eq!(out.result.initial_prices, vec![100.0, 40.0]);
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_sample_paths_capped_by_scenarios() {
        let mut inp = input();
        inp.scenarios = 5;
        inp.confidence_level = None;
        let out = run_simulation(&inp).unwrap().result;
        assert_eq!(out.forecasts[1].sample_paths.len(), 5);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut inp = input();
        inp.weights = Some(vec![0.7, 0.4]);
        assert!(run_simulation(&inp).is_err());
    }

    #[test]
    fn test_single_scenario_skips_forward_risk() {
        let mut inp = input();
        inp.scenarios = 1;
        let out = run_simulation(&inp).unwrap();
        let p = out.result.portfolio.unwrap();
        assert!(p.risk.is_empty());
        assert!(out.warnings.iter().any(|w| w.contains("at least 2 scenarios")));
    }
}
