//! Mixed-model fitting.
//!
//! Responsibilities:
//!
//! - build the θ start grid and its bounds (`grid`)
//! - profile β and σ² out of the (restricted) likelihood (`reml`)
//! - search θ and assemble the fitted model (`fitter`)

pub mod fitter;
pub mod grid;
pub mod reml;

pub use fitter::*;
pub use grid::*;
pub use reml::*;
