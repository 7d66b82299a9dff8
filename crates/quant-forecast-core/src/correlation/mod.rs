pub mod cholesky;
pub mod matrix;

pub use cholesky::CholeskyFactor;
pub use matrix::{AlignedReturns, CorrelationMatrix, CovarianceMatrix};
