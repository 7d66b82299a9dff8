use crate::stats;
use crate::types::validate_weights;
use crate::QuantResult;

use super::gbm::SimulationPaths;

/// Weighted simple return of each scenario over the full horizon:
/// `Σ w_i (S_i(H) - S_i(0)) / S_i(0)`.
pub fn portfolio_terminal_returns(paths: &SimulationPaths, weights: &[f64]) -> QuantResult<Vec<f64>> {
    validate_weights(weights, paths.num_assets())?;
    Ok((0..paths.scenarios())
        .map(|s| {
            weights
                .iter()
                .enumerate()
                .map(|(a, w)| {
                    let s0 = paths.initial(s, a);
                    w * (paths.terminal(s, a) - s0) / s0
                })
                .sum()
        })
        .collect())
}

/// Value of a unit portfolio along one scenario, starting at 1.0.
pub fn portfolio_value_path(paths: &SimulationPaths, weights: &[f64], scenario: usize) -> Vec<f64> {
    (0..=paths.horizon())
        .map(|t| {
            weights
                .iter()
                .enumerate()
                .map(|(a, w)| w * paths.value(scenario, t, a) / paths.initial(scenario, a))
                .sum()
        })
        .collect()
}

/// Maximum drawdown of the weighted portfolio value in each scenario.
pub fn path_drawdowns(paths: &SimulationPaths, weights: &[f64]) -> QuantResult<Vec<f64>> {
    validate_weights(weights, paths.num_assets())?;
    Ok((0..paths.scenarios())
        .map(|s| stats::max_drawdown_of_levels(&portfolio_value_path(paths, weights, s)))
        .collect())
}
