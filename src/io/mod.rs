//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - result exports (CSV/JSON) (`export`)
//! - project-root discovery and output directories (`paths`)

pub mod export;
pub mod ingest;
pub mod paths;

pub use export::*;
pub use ingest::*;
pub use paths::*;
