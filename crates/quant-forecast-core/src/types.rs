use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::QuantError;
use crate::QuantResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Tolerance on portfolio weights summing to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// One swept input: `min..=max` in steps of `step`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub name: String,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    wrap(methodology, assumptions, warnings, elapsed_us, result, "rust_decimal_128bit")
}

/// Same envelope for results computed in floating point.
pub fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    wrap(methodology, assumptions, warnings, elapsed_us, result, "ieee754_f64")
}

fn wrap<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
    precision: &str,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

/// Convert a floating-point estimate into a Decimal, rejecting NaN and infinities.
pub fn decimal_from_f64(field: &str, value: f64) -> QuantResult<Decimal> {
    if !value.is_finite() {
        return Err(QuantError::InvalidInput {
            field: field.into(),
            reason: format!("Value must be finite, got {value}"),
        });
    }
    Decimal::from_f64(value).ok_or_else(|| QuantError::InvalidInput {
        field: field.into(),
        reason: format!("Value {value} is outside the representable decimal range"),
    })
}

/// Validate a weight vector: expected length, finite entries, sum of one.
pub fn validate_weights(weights: &[f64], expected_len: usize) -> QuantResult<()> {
    if weights.len() != expected_len {
        return Err(QuantError::InvalidInput {
            field: "weights".into(),
            reason: format!(
                "Expected {expected_len} weights, got {}",
                weights.len()
            ),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(QuantError::InvalidInput {
            field: "weights".into(),
            reason: "Weights must be finite".into(),
        });
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(QuantError::InvalidInput {
            field: "weights".into(),
            reason: format!("Weights must sum to 1.0, got {sum}"),
        });
    }
    Ok(())
}
