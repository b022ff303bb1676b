//! Reporting: the text summary and the random-effects table.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! details.

pub mod random_effects;
pub mod summary;

pub use random_effects::*;
pub use summary::*;

/// Two-sided 95% standard-normal critical value.
pub const Z_95: f64 = 1.96;
