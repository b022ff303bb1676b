//! Linear mixed-model design rows and predictions.
//!
//! Kept as small, pure functions so the fitter and the output writers share a
//! single definition of the model.

pub mod design;

pub use design::*;
