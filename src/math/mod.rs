//! Mathematical utilities: least squares, simplex optimisation, and normal
//! distribution helpers.

pub mod normal;
pub mod ols;
pub mod optim;

pub use normal::*;
pub use ols::*;
pub use optim::*;
