#![cfg(feature = "valuation")]

use quant_forecast_core::types::SensitivityVariable;
use quant_forecast_core::valuation::{capm, dcf, sensitivity};
use quant_forecast_core::QuantError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn reference_dcf() -> dcf::DcfInput {
    dcf::DcfInput {
        current_price: dec!(100),
        base_cash_flow: None,
        fcf_yield: None,
        growth_rates: vec![dec!(0.10); 5],
        terminal_growth_rate: dec!(0.03),
        discount_rate: Some(dec!(0.10)),
        capm: None,
    }
}

// ===========================================================================
// CAPM tests
// ===========================================================================

#[test]
fn test_capm_reference_rate_is_exact() {
    // 0.045 + 1.0 * 0.06 with no floating-point residue
    let input = capm::CapmInput {
        risk_free_rate: dec!(0.045),
        beta: dec!(1.0),
        market_risk_premium: Some(dec!(0.06)),
        market_return: None,
    };
    let result = capm::calculate_capm(&input).unwrap();
    assert_eq!(result.result.expected_return, dec!(0.105));
    assert_eq!(result.metadata.precision, "rust_decimal_128bit");
}

#[test]
fn test_capm_estimated_beta() {
    let input = capm::CapmInput::from_estimated_beta(dec!(0.045), 0.8, dec!(0.06)).unwrap();
    let out = capm::calculate_capm(&input).unwrap().result;
    assert_eq!(out.expected_return, dec!(0.093));
}

#[test]
fn test_capm_rejects_infinite_beta() {
    assert!(matches!(
        capm::CapmInput::from_estimated_beta(dec!(0.045), f64::INFINITY, dec!(0.06)),
        Err(QuantError::InvalidInput { .. })
    ));
}

// ===========================================================================
// DCF tests
// ===========================================================================

#[test]
fn test_dcf_reference_valuation() {
    // Price 100, FCF 10 (10% yield), 10% growth for 5 years, g_T 3%, r 10%
    let result = dcf::calculate_dcf(&reference_dcf()).unwrap();
    let out = &result.result;

    let flows: Vec<Decimal> = out.projections.iter().map(|p| p.cash_flow).collect();
    assert_eq!(
        flows,
        vec![dec!(11), dec!(12.1), dec!(13.31), dec!(14.641), dec!(16.1051)]
    );
    assert_eq!(out.pv_of_cash_flows, dec!(50));

    // TV = 16.1051 * 1.03 / 0.07
    let expected_tv = dec!(16.1051) * dec!(1.03) / dec!(0.07);
    assert!((out.terminal_value - expected_tv).abs() < dec!(0.0000000001));
    assert!(
        (out.intrinsic_value - dec!(197.1428571428571)).abs() < dec!(0.0000001),
        "Intrinsic value {} should be ~197.142857",
        out.intrinsic_value
    );
    assert!((out.deviation - dec!(0.971428571)).abs() < dec!(0.000001));
}

#[test]
fn test_dcf_bit_for_bit_reproducible() {
    let a = dcf::calculate_dcf(&reference_dcf()).unwrap().result;
    for _ in 0..5 {
        let b = dcf::calculate_dcf(&reference_dcf()).unwrap().result;
        assert_eq!(a.intrinsic_value.serialize(), b.intrinsic_value.serialize());
    }
}

#[test]
fn test_dcf_rejects_discount_below_terminal_growth() {
    let mut input = reference_dcf();
    input.discount_rate = Some(dec!(0.02));
    assert!(matches!(
        dcf::calculate_dcf(&input),
        Err(QuantError::InvalidTerminalGrowth { .. })
    ));
}

#[test]
fn test_dcf_capm_discounting_lowers_value() {
    let mut input = reference_dcf();
    input.discount_rate = None;
    input.capm = Some(capm::CapmInput {
        risk_free_rate: dec!(0.045),
        beta: dec!(1.0),
        market_risk_premium: Some(dec!(0.06)),
        market_return: None,
    });
    let capm_value = dcf::calculate_dcf(&input).unwrap().result.intrinsic_value;
    let base_value = dcf::calculate_dcf(&reference_dcf()).unwrap().result.intrinsic_value;
    assert!(capm_value < base_value);
}

#[test]
fn test_dcf_json_roundtrip_input() {
    let json = r#"{
        "current_price": "100",
        "growth_rates": ["0.10", "0.10", "0.10", "0.10", "0.10"],
        "terminal_growth_rate": "0.03",
        "discount_rate": "0.10"
    }"#;
    let input: dcf::DcfInput = serde_json::from_str(json).unwrap();
    let out = dcf::calculate_dcf(&input).unwrap().result;
    assert_eq!(out.pv_of_cash_flows, dec!(50));
}

// ===========================================================================
// Sensitivity tests
// ===========================================================================

#[test]
fn test_sensitivity_center_matches_dcf() {
    let input = sensitivity::DcfSensitivityInput {
        base: reference_dcf(),
        discount_rate: SensitivityVariable {
            name: "discount_rate".into(),
            min: dec!(0.09),
            max: dec!(0.11),
            step: dec!(0.01),
        },
        terminal_growth: SensitivityVariable {
            name: "terminal_growth".into(),
            min: dec!(0.02),
            max: dec!(0.04),
            step: dec!(0.01),
        },
    };
    let grid = sensitivity::dcf_sensitivity(&input).unwrap().result;
    let direct = dcf::calculate_dcf(&reference_dcf()).unwrap().result;
    assert_eq!(grid.intrinsic_values[1][1], Some(direct.intrinsic_value));
    // value rises with terminal growth along each row
    for row in &grid.intrinsic_values {
        let vals: Vec<Decimal> = row.iter().map(|v| v.unwrap()).collect();
        assert!(vals[0] < vals[1] && vals[1] < vals[2]);
    }
}
