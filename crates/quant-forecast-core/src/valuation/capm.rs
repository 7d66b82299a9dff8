use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::QuantError;
use crate::types::{decimal_from_f64, with_metadata, ComputationOutput, Rate};
use crate::QuantResult;

/// Input parameters for the Capital Asset Pricing Model.
///
/// Exactly one of `market_risk_premium` and `market_return` must be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapmInput {
    /// Risk-free rate (e.g. 10-year government bond yield)
    pub risk_free_rate: Rate,
    /// Beta of the asset against the market
    pub beta: Decimal,
    /// Market return minus the risk-free rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_risk_premium: Option<Rate>,
    /// Expected market return; the premium is derived as R_m - R_f
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_return: Option<Rate>,
}

impl CapmInput {
    /// Build an input from a beta estimated in floating point.
    pub fn from_estimated_beta(
        risk_free_rate: Rate,
        beta: f64,
        market_risk_premium: Rate,
    ) -> QuantResult<Self> {
        Ok(Self {
            risk_free_rate,
            beta: decimal_from_f64("beta", beta)?,
            market_risk_premium: Some(market_risk_premium),
            market_return: None,
        })
    }

    pub fn premium(&self) -> QuantResult<Rate> {
        match (self.market_risk_premium, self.market_return) {
            (Some(p), None) => Ok(p),
            (None, Some(rm)) => Ok(rm - self.risk_free_rate),
            (Some(_), Some(_)) => Err(QuantError::InvalidInput {
                field: "market_risk_premium".into(),
                reason: "Give either market_risk_premium or market_return, not both".into(),
            }),
            (None, None) => Err(QuantError::InvalidInput {
                field: "market_risk_premium".into(),
                reason: "One of market_risk_premium or market_return is required".into(),
            }),
        }
    }
}

/// Output of the CAPM calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapmOutput {
    pub expected_return: Rate,
    pub risk_free_rate: Rate,
    pub beta: Decimal,
    pub market_risk_premium: Rate,
}

/// E[R] = R_f + β (R_m - R_f)
pub fn capm_expected_return(risk_free_rate: Rate, beta: Decimal, market_risk_premium: Rate) -> Rate {
    risk_free_rate + beta * market_risk_premium
}

/// Expected return of an asset under CAPM.
pub fn calculate_capm(input: &CapmInput) -> QuantResult<ComputationOutput<CapmOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let premium = input.premium()?;
    if input.risk_free_rate <= dec!(-1) {
        return Err(QuantError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate must be greater than -100%".into(),
        });
    }

    if input.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): verify market data; betas above 3.0 are unusual",
            input.beta
        ));
    }
    if input.beta < Decimal::ZERO {
        warnings.push(format!(
            "Negative beta ({}): expected return falls below the risk-free rate",
            input.beta
        ));
    }
    if premium > dec!(0.10) {
        warnings.push(format!(
            "Market risk premium ({premium}) exceeds 10%; verify estimate"
        ));
    }
    if premium < Decimal::ZERO {
        warnings.push(format!("Negative market risk premium ({premium})"));
    }

    let output = CapmOutput {
        expected_return: capm_expected_return(input.risk_free_rate, input.beta, premium),
        risk_free_rate: input.risk_free_rate,
        beta: input.beta,
        market_risk_premium: premium,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CAPM: E[R] = Rf + Beta * (Rm - Rf)",
        input,
        warnings,
        elapsed,
        output,
    ))
}
