//! `energy-lmm` library crate.
//!
//! The binary (`lmm`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes
//! - the estimator can be swapped behind `fit::MixedModelFitter`
//! - each output writer can be exercised on its own

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod exercises;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
