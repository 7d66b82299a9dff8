pub mod error;
pub mod stats;
pub mod types;

#[cfg(feature = "valuation")]
pub mod time_value;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "returns")]
pub mod returns;

#[cfg(feature = "correlation")]
pub mod correlation;

#[cfg(feature = "risk")]
pub mod risk;

#[cfg(feature = "simulation")]
pub mod simulation;

#[cfg(feature = "portfolio")]
pub mod portfolio;

#[cfg(feature = "forecast")]
pub mod forecast;

pub use error::QuantError;
pub use types::*;

/// Standard result type for all engine operations
pub type QuantResult<T> = Result<T, QuantError>;
