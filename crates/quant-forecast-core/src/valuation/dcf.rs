use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantError;
use crate::time_value::{discount_factor, npv, present_value};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::QuantResult;

use super::capm::{calculate_capm, CapmInput, CapmOutput};

/// Base cash flow as a fraction of price when none is supplied.
pub const DEFAULT_FCF_YIELD: Decimal = dec!(0.10);

const TERMINAL_SHARE_WARNING: Decimal = dec!(0.75);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input parameters for a per-share free cash flow DCF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    /// Current market price per share
    pub current_price: Money,
    /// Year-0 free cash flow per share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_cash_flow: Option<Money>,
    /// Yield used to derive the base cash flow from the price when
    /// `base_cash_flow` is absent (default 10%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcf_yield: Option<Rate>,
    /// One growth rate per explicit projection year
    pub growth_rates: Vec<Rate>,
    /// Perpetuity growth after the explicit window
    pub terminal_growth_rate: Rate,
    /// Discount rate (cost of equity)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    /// If provided, the discount rate is the CAPM expected return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capm: Option<CapmInput>,
}

/// One explicit projection year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfYear {
    pub year: u32,
    pub growth_rate: Rate,
    pub cash_flow: Money,
    pub discount_factor: Rate,
    pub present_value: Money,
}

/// Output of the DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    pub current_price: Money,
    pub base_cash_flow: Money,
    pub discount_rate: Rate,
    pub terminal_growth_rate: Rate,
    pub projections: Vec<DcfYear>,
    /// Sum of present values of the explicit-period flows
    pub pv_of_cash_flows: Money,
    pub terminal_value: Money,
    pub pv_of_terminal_value: Money,
    /// Intrinsic value per share = PV(flows) + PV(TV)
    pub intrinsic_value: Money,
    /// (intrinsic - current) / current, as a decimal rate
    pub deviation: Rate,
    /// PV(TV) as a fraction of intrinsic value
    pub terminal_value_share: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capm: Option<CapmOutput>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a single-stage-plus-perpetuity DCF on free cash flow per share.
///
/// FCF_t = FCF_{t-1} (1 + g_t), PV_t = FCF_t / (1 + r)^t,
/// TV = FCF_n (1 + g_T) / (r - g_T), PV_TV = TV / (1 + r)^n.
pub fn calculate_dcf(input: &DcfInput) -> QuantResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // --- Resolve discount rate ---
    let (discount_rate, capm) = resolve_discount_rate(input, &mut warnings)?;

    // --- Validate ---
    validate_dcf_input(input, discount_rate)?;

    let base_cash_flow = resolve_base_cash_flow(input, &mut warnings);
    if base_cash_flow <= Decimal::ZERO {
        warnings.push(format!(
            "Non-positive base cash flow ({base_cash_flow}): intrinsic value will be non-positive"
        ));
    }

    // --- Project cash flows ---
    let projections = build_projections(input, base_cash_flow, discount_rate)?;
    let flows: Vec<Money> = projections.iter().map(|p| p.cash_flow).collect();
    let pv_of_cash_flows = npv(discount_rate, &flows)?;
    let last = projections
        .last()
        .ok_or_else(|| QuantError::InsufficientData("No projection years generated".into()))?;

    // --- Terminal value ---
    let g = input.terminal_growth_rate;
    let terminal_value = (last.cash_flow * (Decimal::ONE + g))
        .checked_div(discount_rate - g)
        .ok_or_else(|| QuantError::NumericOverflow {
            context: "terminal value".into(),
        })?;
    let pv_of_terminal_value = present_value(terminal_value, discount_rate, last.year)?;

    let intrinsic_value = pv_of_cash_flows + pv_of_terminal_value;
    let deviation = (intrinsic_value - input.current_price) / input.current_price;

    let terminal_value_share = if intrinsic_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_of_terminal_value / intrinsic_value
    };
    if terminal_value_share > TERMINAL_SHARE_WARNING {
        warnings.push(format!(
            "Terminal value represents {:.1}% of intrinsic value; consider extending the explicit forecast period",
            terminal_value_share * dec!(100)
        ));
    }

    let output = DcfOutput {
        current_price: input.current_price,
        base_cash_flow,
        discount_rate,
        terminal_growth_rate: g,
        projections,
        pv_of_cash_flows,
        terminal_value,
        pv_of_terminal_value,
        intrinsic_value,
        deviation,
        terminal_value_share,
        capm,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Free cash flow DCF with Gordon growth terminal value",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn resolve_discount_rate(
    input: &DcfInput,
    warnings: &mut Vec<String>,
) -> QuantResult<(Rate, Option<CapmOutput>)> {
    match (input.discount_rate, input.capm.as_ref()) {
        (Some(r), None) => Ok((r, None)),
        (None, Some(capm_input)) => {
            let capm_out = calculate_capm(capm_input)?;
            for w in &capm_out.warnings {
                warnings.push(format!("[CAPM] {w}"));
            }
            Ok((capm_out.result.expected_return, Some(capm_out.result)))
        }
        (Some(_), Some(_)) => Err(QuantError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Give either discount_rate or capm, not both".into(),
        }),
        (None, None) => Err(QuantError::InvalidInput {
            field: "discount_rate".into(),
            reason: "One of discount_rate or capm is required".into(),
        }),
    }
}

fn validate_dcf_input(input: &DcfInput, discount_rate: Rate) -> QuantResult<()> {
    // Gordon growth constraint, checked before any terminal value is formed
    if discount_rate <= input.terminal_growth_rate {
        return Err(QuantError::InvalidTerminalGrowth {
            discount_rate,
            terminal_growth: input.terminal_growth_rate,
        });
    }
    if discount_rate <= dec!(-1) {
        return Err(QuantError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    if input.current_price <= Decimal::ZERO {
        return Err(QuantError::InvalidInput {
            field: "current_price".into(),
            reason: "Current price must be positive".into(),
        });
    }
    if input.growth_rates.is_empty() {
        return Err(QuantError::InsufficientData(
            "At least one projection year growth rate is required".into(),
        ));
    }
    for (i, g) in input.growth_rates.iter().enumerate() {
        if *g <= dec!(-1) {
            return Err(QuantError::InvalidInput {
                field: format!("growth_rates[{i}]"),
                reason: format!("Growth rate must be greater than -100%, got {g}"),
            });
        }
    }
    if let Some(y) = input.fcf_yield {
        if y <= Decimal::ZERO {
            return Err(QuantError::InvalidInput {
                field: "fcf_yield".into(),
                reason: "FCF yield must be positive".into(),
            });
        }
    }
    Ok(())
}

fn resolve_base_cash_flow(input: &DcfInput, warnings: &mut Vec<String>) -> Money {
    match input.base_cash_flow {
        Some(cf) => cf,
        None => {
            let yield_used = input.fcf_yield.unwrap_or(DEFAULT_FCF_YIELD);
            let cf = input.current_price * yield_used;
            warnings.push(format!(
                "No base cash flow supplied: derived as price x {yield_used} FCF yield = {cf}"
            ));
            cf
        }
    }
}

fn build_projections(
    input: &DcfInput,
    base_cash_flow: Money,
    discount_rate: Rate,
) -> QuantResult<Vec<DcfYear>> {
    let mut projections = Vec::with_capacity(input.growth_rates.len());
    let mut prev = base_cash_flow;

    for (idx, growth) in input.growth_rates.iter().enumerate() {
        let year = idx as u32 + 1;
        let cash_flow = prev
            .checked_mul(Decimal::ONE + growth)
            .ok_or_else(|| QuantError::NumericOverflow {
                context: format!("cash flow in year {year}"),
            })?;

        projections.push(DcfYear {
            year,
            growth_rate: *growth,
            cash_flow,
            discount_factor: discount_factor(discount_rate, year)?,
            present_value: present_value(cash_flow, discount_rate, year)?,
        });
        prev = cash_flow;
    }

    Ok(projections)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dcf_input() -> DcfInput {
        DcfInput {
            current_price: dec!(100),
            base_cash_flow: None,
            fcf_yield: None,
            growth_rates: vec![dec!(0.10); 5],
            terminal_growth_rate: dec!(0.03),
            discount_rate: Some(dec!(0.10)),
            capm: None,
        }
    }

    #[test]
    fn test_basic_dcf() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        let out = &result.result;

        assert_eq!(out.base_cash_flow, dec!(10));
        assert_eq!(out.projections.len(), 5);
        assert_eq!(out.projections[4].cash_flow, dec!(16.1051));
        // flows grow at the discount rate so each discounts to exactly 10
        assert_eq!(out.pv_of_cash_flows, dec!(50));

        let expected_pv_tv = dec!(147.142857142857);
        assert!(
            (out.pv_of_terminal_value - expected_pv_tv).abs() < dec!(0.000001),
            "PV of TV {} should be close to {expected_pv_tv}",
            out.pv_of_terminal_value
        );
        assert!((out.intrinsic_value - dec!(197.142857142857)).abs() < dec!(0.000001));
        assert!((out.deviation - dec!(0.971428571429)).abs() < dec!(0.000001));
        assert!(result.warnings.iter().any(|w| w.contains("No base cash flow")));
    }

    #[test]
    fn test_dcf_is_reproducible() {
        let a = calculate_dcf(&sample_dcf_input()).unwrap().result;
        let b = calculate_dcf(&sample_dcf_input()).unwrap().result;
        assert_eq!(a.intrinsic_value, b.intrinsic_value);
        assert_eq!(a.terminal_value, b.terminal_value);
    }

    #[test]
    fn test_terminal_growth_exceeds_discount_rate() {
        let mut input = sample_dcf_input();
        input.discount_rate = Some(dec!(0.02));
        match calculate_dcf(&input) {
            Err(QuantError::InvalidTerminalGrowth {
                discount_rate,
                terminal_growth,
            }) => {
                assert_eq!(discount_rate, dec!(0.02));
                assert_eq!(terminal_growth, dec!(0.03));
            }
            other => panic!("expected InvalidTerminalGrowth, got {other:?}"),
        }
    }

    #[test]
    fn test_equal_rates_rejected() {
        let mut input = sample_dcf_input();
        input.terminal_growth_rate = dec!(0.10);
        assert!(matches!(
            calculate_dcf(&input),
            Err(QuantError::InvalidTerminalGrowth { .. })
        ));
    }

    #[test]
    fn test_dcf_with_capm_discount_rate() {
        let mut input = sample_dcf_input();
        input.discount_rate = None;
        input.capm = Some(CapmInput {
            risk_free_rate: dec!(0.045),
            beta: dec!(1.0),
            market_risk_premium: Some(dec!(0.06)),
            market_return: None,
        });
        let out = calculate_dcf(&input).unwrap().result;
        assert_eq!(out.discount_rate, dec!(0.105));
        assert!(out.capm.is_some());
    }

    #[test]
    fn test_explicit_base_cash_flow() {
        let mut input = sample_dcf_input();
        input.base_cash_flow = Some(dec!(5));
        let result = calculate_dcf(&input).unwrap();
        assert_eq!(result.result.pv_of_cash_flows, dec!(25));
        assert!(!result.warnings.iter().any(|w| w.contains("No base cash flow")));
    }

    #[test]
    fn test_discount_rate_source_ambiguity() {
        let mut input = sample_dcf_input();
        input.discount_rate = None;
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_empty_growth_rejected() {
        let mut input = sample_dcf_input();
        input.growth_rates.clear();
        assert!(matches!(
            calculate_dcf(&input),
            Err(QuantError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_terminal_share_warning() {
        let mut input = sample_dcf_input();
        input.terminal_growth_rate = dec!(0.06);
        let result = calculate_dcf(&input).unwrap();
        assert!(result.result.terminal_value_share > dec!(0.75));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Terminal value represents")));
    }

    #[test]
    fn test_methodology() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        assert_eq!(
            result.methodology,
            "Free cash flow DCF with Gordon growth terminal value"
        );
    }
}
