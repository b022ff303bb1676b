//! Export tables and the fitted model.
//!
//! - random-effects table → CSV (no index column)
//! - observations → CSV in the ingest schema (used by `simulate`)
//! - fitted model → pretty JSON

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::domain::{FittedModel, GROUP_COLUMN, Observation, RESPONSE, RandomEffect};
use crate::error::AppError;
use crate::io::paths::ensure_parent_dir;
use crate::report::RandomEffectsTable;

/// Write the random-effects table as CSV.
pub fn write_random_effects_csv(table: &RandomEffectsTable, path: &Path) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AppError::io(format!("Failed to create random-effects CSV '{}': {e}", path.display()))
    })?;

    writer
        .write_record(table.headers())
        .map_err(|e| AppError::io(format!("Failed to write random-effects CSV header: {e}")))?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(table.slope_count + 4);
        record.push(row.intercept.to_string());
        // Rows with fewer slopes than the table are padded with empty cells.
        for k in 0..table.slope_count {
            record.push(row.slopes.get(k).map(f64::to_string).unwrap_or_default());
        }
        record.push(row.group.clone());
        record.push(row.lower.to_string());
        record.push(row.upper.to_string());
        writer
            .write_record(&record)
            .map_err(|e| AppError::io(format!("Failed to write random-effects CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", path.display())))
}

/// Write observations in the ingest schema (`shortfall,n_rooms,age,local_authority_code`).
pub fn write_observations_csv(observations: &[Observation], path: &Path) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create CSV '{}': {e}", path.display())))?;

    writer
        .write_record([RESPONSE, "n_rooms", "age", GROUP_COLUMN])
        .map_err(|e| AppError::io(format!("Failed to write CSV header: {e}")))?;
    for o in observations {
        writer
            .write_record([
                o.shortfall.to_string(),
                o.n_rooms.to_string(),
                o.age.to_string(),
                o.group.clone(),
            ])
            .map_err(|e| AppError::io(format!("Failed to write CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", path.display())))
}

#[derive(Debug, Serialize)]
struct FixedEffectExport<'a> {
    name: &'a str,
    coef: f64,
    std_err: f64,
}

#[derive(Debug, Serialize)]
struct GroupExport<'a> {
    group: &'a str,
    size: usize,
    #[serde(flatten)]
    effect: &'a RandomEffect,
}

#[derive(Debug, Serialize)]
struct ModelExport<'a> {
    formula: &'a str,
    method: &'a str,
    n_obs: usize,
    n_groups: usize,
    converged: bool,
    iterations: usize,
    log_likelihood: f64,
    scale: f64,
    fixed_effects: Vec<FixedEffectExport<'a>>,
    random_slopes: &'a [String],
    /// Row-major random-effects covariance.
    cov_re: Vec<Vec<f64>>,
    random_effects: Vec<GroupExport<'a>>,
}

/// Write the fitted model as pretty JSON.
pub fn write_model_json(model: &FittedModel, path: &Path) -> Result<(), AppError> {
    ensure_parent_dir(path)?;

    let std_errors = model.fixed_std_errors();
    let export = ModelExport {
        formula: &model.formula,
        method: model.method.display_name(),
        n_obs: model.n_obs,
        n_groups: model.n_groups(),
        converged: model.converged,
        iterations: model.iterations,
        log_likelihood: model.log_likelihood,
        scale: model.scale,
        fixed_effects: model
            .fixed_names
            .iter()
            .zip(&model.fixed_effects)
            .zip(&std_errors)
            .map(|((name, &coef), &std_err)| FixedEffectExport {
                name,
                coef,
                std_err,
            })
            .collect(),
        random_slopes: &model.slope_names,
        cov_re: model
            .cov_re
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect(),
        random_effects: model
            .random_effects
            .iter()
            .map(|g| GroupExport {
                group: &g.group,
                size: g.size,
                effect: &g.effect,
            })
            .collect(),
    };

    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create model JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &export)
        .map_err(|e| AppError::io(format!("Failed to write model JSON '{}': {e}", path.display())))
}
