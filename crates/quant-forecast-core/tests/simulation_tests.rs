#![cfg(feature = "simulation")]

use quant_forecast_core::correlation::{CholeskyFactor, CorrelationMatrix};
use quant_forecast_core::simulation::{
    correlated_normals, portfolio_terminal_returns, run_simulation, simulate_paths, GbmSpec,
    SimulationInput,
};
use quant_forecast_core::QuantError;
use rand::rngs::StdRng;
use rand::SeedableRng;

const DT: f64 = 1.0 / 252.0;

fn three_asset_correlation() -> CorrelationMatrix {
    CorrelationMatrix::new(vec![
        vec![1.0, 0.5, 0.3],
        vec![0.5, 1.0, -0.2],
        vec![0.3, -0.2, 1.0],
    ])
    .unwrap()
}

fn sample_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    sxy / (sxx.sqrt() * syy.sqrt())
}

// ===========================================================================
// Correlation preservation
// ===========================================================================

#[test]
fn test_first_step_innovations_preserve_correlation() {
    let rho = three_asset_correlation();
    let drifts = [0.05, 0.08, 0.02];
    let vols = [0.2, 0.3, 0.15];
    let spec = GbmSpec {
        initial_prices: vec![100.0, 50.0, 20.0],
        drifts: drifts.to_vec(),
        volatilities: vols.to_vec(),
        correlation: rho.clone(),
        horizon: 1,
        scenarios: 200_000,
        dt: DT,
        seed: Some(42),
    };
    let paths = simulate_paths(&spec).unwrap();

    let innovations: Vec<Vec<f64>> = (0..3)
        .map(|a| {
            let drift = (drifts[a] - 0.5 * vols[a] * vols[a]) * DT;
            let scale = vols[a] * DT.sqrt();
            (0..paths.scenarios())
                .map(|s| ((paths.terminal(s, a) / paths.initial(s, a)).ln() - drift) / scale)
                .collect()
        })
        .collect();

    for i in 0..3 {
        for j in (i + 1)..3 {
            let r = sample_correlation(&innovations[i], &innovations[j]);
            assert!(
                (r - rho.get(i, j)).abs() < 0.01,
                "corr({i},{j}) = {r}, expected {}",
                rho.get(i, j)
            );
        }
    }
}

#[test]
fn test_correlated_normals_match_target() {
    let rho = three_asset_correlation();
    let factor = CholeskyFactor::decompose(&rho).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let m = 200_000;
    let e = correlated_normals(&factor, m, &mut rng).unwrap();
    let col = |a: usize| -> Vec<f64> { (0..m).map(|s| e[s * 3 + a]).collect() };
    let r01 = sample_correlation(&col(0), &col(1));
    let r12 = sample_correlation(&col(1), &col(2));
    assert!((r01 - 0.5).abs() < 0.01, "r01 {r01}");
    assert!((r12 + 0.2).abs() < 0.01, "r12 {r12}");
}

// ===========================================================================
// Martingale under zero drift
// ===========================================================================

#[test]
fn test_zero_drift_mean_terminal_price() {
    let spec = GbmSpec {
        initial_prices: vec![100.0],
        drifts: vec![0.0],
        volatilities: vec![0.2],
        correlation: CorrelationMatrix::identity(1),
        horizon: 252,
        scenarios: 20_000,
        dt: DT,
        seed: Some(2024),
    };
    let paths = simulate_paths(&spec).unwrap();
    let mean: f64 =
        (0..paths.scenarios()).map(|s| paths.terminal(s, 0)).sum::<f64>() / paths.scenarios() as f64;
    assert!(
        (mean / 100.0 - 1.0).abs() < 0.01,
        "mean terminal price {mean} drifted from 100"
    );
}

// ===========================================================================
// Edge cases
// ===========================================================================

#[test]
fn test_zero_horizon_returns_initial_prices_only() {
    let input = SimulationInput {
        assets: vec!["A".into(), "B".into()],
        initial_prices: vec![10.0, 20.0],
        drifts: vec![0.1, 0.1],
        volatilities: vec![0.2, 0.2],
        correlation: CorrelationMatrix::identity(2),
        horizon: 0,
        scenarios: 100,
        dt: DT,
        seed: Some(1),
        weights: Some(vec![0.5, 0.5]),
        confidence_level: Some(0.95),
        sample_paths: 30,
        mc_draws: 10_000,
    };
    let out = run_simulation(&input).unwrap();
    assert_eq!(out.result.initial_prices, vec![10.0, 20.0]);
    assert!(out.result.forecasts.is_empty());
    assert!(out.result.portfolio.is_none());
}

#[test]
fn test_single_scenario_follows_update_formula() {
    // Perfect correlation: both assets see the same innovation each step
    let spec = GbmSpec {
        initial_prices: vec![100.0, 40.0],
        drifts: vec![0.06, 0.1],
        volatilities: vec![0.2, 0.4],
        correlation: CorrelationMatrix::new(vec![vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap(),
        horizon: 50,
        scenarios: 1,
        dt: DT,
        seed: Some(5),
    };
    let paths = simulate_paths(&spec).unwrap();
    assert_eq!(paths.scenarios(), 1);
    for t in 1..=50 {
        let e: Vec<f64> = (0..2)
            .map(|a| {
                let drift = (spec.drifts[a] - 0.5 * spec.volatilities[a].powi(2)) * DT;
                let scale = spec.volatilities[a] * DT.sqrt();
                ((paths.value(0, t, a) / paths.value(0, t - 1, a)).ln() - drift) / scale
            })
            .collect();
        assert!((e[0] - e[1]).abs() < 1e-8, "step {t}: {} vs {}", e[0], e[1]);
    }
}

#[test]
fn test_results_independent_of_thread_count() {
    let spec = GbmSpec {
        initial_prices: vec![100.0, 50.0, 20.0],
        drifts: vec![0.05, 0.08, 0.02],
        volatilities: vec![0.2, 0.3, 0.15],
        correlation: three_asset_correlation(),
        horizon: 10,
        scenarios: 1_000,
        dt: DT,
        seed: Some(99),
    };
    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| simulate_paths(&spec).unwrap());
    let multi = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| simulate_paths(&spec).unwrap());
    assert_eq!(single, multi);
}

#[test]
fn test_indefinite_correlation_rejected() {
    let rho = CorrelationMatrix::new(vec![
        vec![1.0, 0.9, -0.9],
        vec![0.9, 1.0, 0.9],
        vec![-0.9, 0.9, 1.0],
    ])
    .unwrap();
    let spec = GbmSpec {
        initial_prices: vec![1.0, 1.0, 1.0],
        drifts: vec![0.0; 3],
        volatilities: vec![0.1; 3],
        correlation: rho,
        horizon: 5,
        scenarios: 10,
        dt: DT,
        seed: None,
    };
    assert!(matches!(
        simulate_paths(&spec),
        Err(QuantError::NonPositiveDefiniteMatrix { .. })
    ));
}

#[test]
fn test_portfolio_returns_need_valid_weights() {
    let spec = GbmSpec {
        initial_prices: vec![100.0, 50.0, 20.0],
        drifts: vec![0.05, 0.08, 0.02],
        volatilities: vec![0.2, 0.3, 0.15],
        correlation: three_asset_correlation(),
        horizon: 5,
        scenarios: 10,
        dt: DT,
        seed: Some(3),
    };
    let paths = simulate_paths(&spec).unwrap();
    assert!(portfolio_terminal_returns(&paths, &[0.2, 0.3, 0.5]).is_ok());
    assert!(portfolio_terminal_returns(&paths, &[0.2, 0.3, 0.4]).is_err());
    assert!(portfolio_terminal_returns(&paths, &[f64::NAN, 0.5, 0.5]).is_err());
}
