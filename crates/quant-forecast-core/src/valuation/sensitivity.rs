use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantError;
use crate::types::*;
use crate::QuantResult;

use super::dcf::{calculate_dcf, DcfInput};

const MAX_GRID_CELLS: usize = 10_000;

/// Input for a discount rate x terminal growth sweep of the DCF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfSensitivityInput {
    /// Base case; its discount rate and terminal growth are overridden per cell
    pub base: DcfInput,
    pub discount_rate: SensitivityVariable,
    pub terminal_growth: SensitivityVariable,
}

/// Intrinsic value per (discount rate, terminal growth) cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfSensitivityOutput {
    pub discount_rates: Vec<Rate>,
    pub terminal_growth_rates: Vec<Rate>,
    /// `intrinsic_values[i][j]` for `discount_rates[i]`, `terminal_growth_rates[j]`;
    /// `None` where the discount rate does not exceed terminal growth
    pub intrinsic_values: Vec<Vec<Option<Money>>>,
    /// Deviation from the current price per cell
    pub deviations: Vec<Vec<Option<Rate>>>,
    pub current_price: Money,
}

/// Generate the sweep values for a sensitivity variable from min to max with step.
fn generate_sweep_values(var: &SensitivityVariable) -> QuantResult<Vec<Decimal>> {
    if var.step <= Decimal::ZERO {
        return Err(QuantError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Step must be positive".into(),
        });
    }
    if var.min > var.max {
        return Err(QuantError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Min must be <= max".into(),
        });
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
        if values.len() > MAX_GRID_CELLS {
            return Err(QuantError::InvalidInput {
                field: format!("variable:{}", var.name),
                reason: format!("Sweep exceeds {MAX_GRID_CELLS} values"),
            });
        }
    }
    // Include max when the step doesn't land exactly on it
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    Ok(values)
}

/// Re-run the DCF over a grid of discount rates and terminal growth rates.
pub fn dcf_sensitivity(
    input: &DcfSensitivityInput,
) -> QuantResult<ComputationOutput<DcfSensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let rates = generate_sweep_values(&input.discount_rate)?;
    let growths = generate_sweep_values(&input.terminal_growth)?;
    if rates.len() * growths.len() > MAX_GRID_CELLS {
        return Err(QuantError::InvalidInput {
            field: "grid".into(),
            reason: format!(
                "{} x {} cells exceeds {MAX_GRID_CELLS}",
                rates.len(),
                growths.len()
            ),
        });
    }

    let mut intrinsic_values = Vec::with_capacity(rates.len());
    let mut deviations = Vec::with_capacity(rates.len());
    let mut undefined = 0usize;

    for r in &rates {
        let mut value_row = Vec::with_capacity(growths.len());
        let mut dev_row = Vec::with_capacity(growths.len());
        for g in &growths {
            let cell = DcfInput {
                discount_rate: Some(*r),
                capm: None,
                terminal_growth_rate: *g,
                ..input.base.clone()
            };
            match calculate_dcf(&cell) {
                Ok(out) => {
                    value_row.push(Some(out.result.intrinsic_value));
                    dev_row.push(Some(out.result.deviation));
                }
                Err(QuantError::InvalidTerminalGrowth { .. }) => {
                    undefined += 1;
                    value_row.push(None);
                    dev_row.push(None);
                }
                Err(e) => return Err(e),
            }
        }
        intrinsic_values.push(value_row);
        deviations.push(dev_row);
    }

    if undefined > 0 {
        warnings.push(format!(
            "{undefined} cells undefined: discount rate does not exceed terminal growth"
        ));
    }

    let output = DcfSensitivityOutput {
        discount_rates: rates,
        terminal_growth_rates: growths,
        intrinsic_values,
        deviations,
        current_price: input.base.current_price,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DCF sensitivity: discount rate x terminal growth",
        &serde_json::json!({
            "discount_rate": input.discount_rate,
            "terminal_growth": input.terminal_growth,
            "growth_rates": input.base.growth_rates,
            "current_price": input.base.current_price,
        }),
        warnings,
        elapsed,
        output,
    ))
}
