use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Misaligned series: {common_dates} common dates after alignment, at least {required} required")]
    MisalignedSeries { common_dates: usize, required: usize },

    #[error("Degenerate asset: '{asset}' has zero variance")]
    DegenerateAsset { asset: String },

    #[error("Matrix is not positive semi-definite (pivot {pivot})")]
    NonPositiveDefiniteMatrix { pivot: usize },

    #[error("Empty tail: no observations at or below VaR at confidence {confidence_level}")]
    EmptyTail { confidence_level: f64 },

    #[error("Invalid terminal growth: discount rate ({discount_rate}) must exceed terminal growth ({terminal_growth})")]
    InvalidTerminalGrowth {
        discount_rate: Decimal,
        terminal_growth: Decimal,
    },

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for QuantError {
    fn from(e: serde_json::Error) -> Self {
        QuantError::SerializationError(e.to_string())
    }
}
