pub mod performance;
pub mod series;
