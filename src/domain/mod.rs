//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input records (`Observation`, `ObservationTable`)
//! - the model formula and optimizer controls (`ModelSpec`, `FitOptions`)
//! - fit outputs (`FittedModel`, `RandomEffect`, `GroupEffect`)
//! - run configuration (`PipelineConfig`)

pub mod types;

pub use types::*;
