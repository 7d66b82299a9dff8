#![cfg(feature = "portfolio")]

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use quant_forecast_core::correlation::matrix::{align_series, estimate_correlation, CorrelationInput};
use quant_forecast_core::portfolio::frontier::{
    analyse_frontier, portfolio_return_series, FrontierInput, FrontierPoint,
};
use quant_forecast_core::portfolio::optimiser::{
    annualised_moments, min_variance_weights, optimise_portfolio, OptimiserInput,
};
use quant_forecast_core::returns::performance::{calculate_performance, PerformanceInput};
use quant_forecast_core::returns::series::{
    compute_returns, PricePoint, ReturnFrequency, ReturnKind, ReturnSeries,
};
use quant_forecast_core::QuantError;

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(n as i64)
}

fn price_series(asset: &str, start: f64, moves: &[f64], skip: Option<u32>) -> ReturnSeries {
    let mut prices = Vec::new();
    let mut p = start;
    for (i, m) in std::iter::once(&0.0).chain(moves).enumerate() {
        p *= 1.0 + m;
        if Some(i as u32) != skip {
            prices.push(PricePoint {
                date: day(i as u32),
                price: p,
            });
        }
    }
    compute_returns(asset, &prices, ReturnKind::Simple).unwrap()
}

fn universe() -> Vec<ReturnSeries> {
    let a = [0.01, -0.02, 0.015, 0.003, -0.007, 0.012, -0.004, 0.009, -0.011, 0.006, 0.002, -0.003];
    let b = [0.004, -0.01, 0.02, -0.006, 0.001, 0.008, -0.012, 0.003, -0.002, 0.01, -0.004, 0.005];
    let c = [-0.003, 0.006, -0.01, 0.012, 0.002, -0.005, 0.007, -0.001, 0.004, -0.008, 0.011, 0.001];
    vec![
        price_series("A", 100.0, &a, None),
        price_series("B", 50.0, &b, Some(4)),
        price_series("C", 20.0, &c, None),
    ]
}

// ===========================================================================
// Alignment and correlation
// ===========================================================================

#[test]
fn test_missing_price_drops_dates_everywhere() {
    let out = estimate_correlation(&CorrelationInput { series: universe() }).unwrap();
    // B lacks day 4, so its returns for days 4 and 5 collapse into one dated day 5
    assert_eq!(out.result.common_dates, 11);
    assert!(!out.warnings.is_empty());
    let rho = &out.result.correlation;
    for i in 0..3 {
        assert_eq!(rho.get(i, i), 1.0);
        for j in 0..3 {
            assert_eq!(rho.get(i, j), rho.get(j, i));
        }
    }
}

#[test]
fn test_degenerate_asset_is_named() {
    let flat = price_series("FLAT", 10.0, &[0.0; 12], None);
    let mut series = universe();
    series.push(flat);
    match estimate_correlation(&CorrelationInput { series }) {
        Err(QuantError::DegenerateAsset { asset }) => assert_eq!(asset, "FLAT"),
        other => panic!("expected DegenerateAsset, got {other:?}"),
    }
}

// ===========================================================================
// Optimiser and frontier
// ===========================================================================

#[test]
fn test_min_variance_from_history() {
    let aligned = align_series(&universe()).unwrap();
    let (mu, cov) = annualised_moments(&aligned, 252.0).unwrap();
    let w = min_variance_weights(&cov).unwrap();
    let gmv_var = cov.portfolio_variance(&w);
    // No other fully invested mix does better
    for probe in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0 / 3.0; 3]] {
        assert!(gmv_var <= cov.portfolio_variance(&probe) + 1e-15);
    }
    let out = optimise_portfolio(&OptimiserInput {
        assets: aligned.assets.clone(),
        expected_returns: mu,
        covariance: cov,
        risk_free_rate: 0.02,
    })
    .unwrap();
    assert_eq!(out.result.min_variance.weights.len(), 3);
}

#[test]
fn test_frontier_table_from_json() {
    let json = r#"{
        "assets": ["A", "B"],
        "points": [
            { "expected_return": 0.0002, "risk": 0.007, "weights": [0.7, 0.3] },
            { "expected_return": 0.0004, "risk": 0.008, "weights": [0.5, 0.5] },
            { "expected_return": 0.0007, "risk": 0.02, "weights": [0.0, 1.0] }
        ],
        "risk_free_rate": 0.02
    }"#;
    let input: FrontierInput = serde_json::from_str(json).unwrap();
    let out = analyse_frontier(&input).unwrap().result;
    assert_eq!(out.min_variance.index, 0);
    assert_eq!(out.max_return.index, 2);
    assert_eq!(out.max_sharpe.index, 1);
}

#[test]
fn test_frontier_rejects_zero_risk() {
    let input = FrontierInput {
        assets: vec!["A".into()],
        points: vec![FrontierPoint {
            expected_return: 0.001,
            risk: 0.0,
            weights: vec![1.0],
        }],
        risk_free_rate: 0.0,
        frequency: ReturnFrequency::Daily,
    };
    assert!(analyse_frontier(&input).is_err());
}

// ===========================================================================
// Portfolio series and performance
// ===========================================================================

#[test]
fn test_portfolio_series_feeds_performance() {
    let aligned = align_series(&universe()).unwrap();
    let series = portfolio_return_series(&aligned, &[0.4, 0.4, 0.2]).unwrap();
    let market = portfolio_return_series(&aligned, &[0.5, 0.5, 0.0]).unwrap();
    let out = calculate_performance(&PerformanceInput {
        returns: series.values(),
        market_returns: Some(market.values()),
        risk_free_rate: 0.02,
        frequency: ReturnFrequency::Daily,
        volatility_window: 5,
        beta_window: 5,
    })
    .unwrap()
    .result;
    assert_eq!(out.observations, aligned.num_dates());
    assert!(out.beta.is_some());
    assert_eq!(out.rolling_volatility.len(), aligned.num_dates() - 4);
}
