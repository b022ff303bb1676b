//! Synthetic data generation.

pub mod simulate;

pub use simulate::*;
