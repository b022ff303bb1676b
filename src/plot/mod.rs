//! Diagnostic charts.

pub mod diagnostics;

pub use diagnostics::*;
