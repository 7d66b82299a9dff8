pub mod frontier;
pub mod optimiser;
