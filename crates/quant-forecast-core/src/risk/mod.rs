pub mod var;

pub use var::{RiskEstimate, RiskMethod};
