use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::QuantError;
use crate::types::{Money, Rate};
use crate::QuantResult;

/// (1 + r)^n with overflow reported instead of panicking.
pub fn compound_factor(rate: Rate, periods: u32) -> QuantResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(QuantError::InvalidInput {
            field: "rate".into(),
            reason: "Rate must be greater than -100%".into(),
        });
    }
    (Decimal::ONE + rate)
        .checked_powi(periods as i64)
        .ok_or_else(|| QuantError::NumericOverflow {
            context: format!("(1 + {rate})^{periods}"),
        })
}

/// 1 / (1 + r)^n
pub fn discount_factor(rate: Rate, periods: u32) -> QuantResult<Decimal> {
    let factor = compound_factor(rate, periods)?;
    Decimal::ONE
        .checked_div(factor)
        .ok_or_else(|| QuantError::NumericOverflow {
            context: format!("discount factor at period {periods}"),
        })
}

/// Present value of a single amount received after `periods` periods.
///
/// Divides by the compound factor rather than multiplying by the rounded
/// discount factor, so flows growing at the discount rate discount exactly.
pub fn present_value(amount: Money, rate: Rate, periods: u32) -> QuantResult<Money> {
    let factor = compound_factor(rate, periods)?;
    amount
        .checked_div(factor)
        .ok_or_else(|| QuantError::NumericOverflow {
            context: format!("present value at period {periods}"),
        })
}

/// Net present value of flows received at periods 1..=n.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> QuantResult<Money> {
    cash_flows
        .iter()
        .enumerate()
        .try_fold(Decimal::ZERO, |acc, (t, cf)| {
            Ok(acc + present_value(*cf, rate, t as u32 + 1)?)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_factor() {
        assert_eq!(compound_factor(dec!(0.10), 2).unwrap(), dec!(1.21));
        assert_eq!(compound_factor(dec!(0.05), 0).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_rate_below_minus_one_rejected() {
        assert!(compound_factor(dec!(-1), 3).is_err());
    }

    #[test]
    fn test_present_value_exact() {
        assert_eq!(present_value(dec!(12.1), dec!(0.10), 2).unwrap(), dec!(10));
    }

    #[test]
    fn test_npv_of_growing_flows() {
        let flows = [dec!(11), dec!(12.1), dec!(13.31)];
        assert_eq!(npv(dec!(0.10), &flows).unwrap(), dec!(30));
    }

    #[test]
    fn test_discount_factor() {
        let df = discount_factor(dec!(0.25), 1).unwrap();
        assert_eq!(df, dec!(0.8));
    }
}
