//! The mixed-model pipeline.
//!
//! load CSV -> fit -> {summary, random-effects table, diagnostics}
//!
//! The three writers only read the fitted model, so they run concurrently.
//! Any failure aborts the run; outputs already written are left in place.

use rayon::join;
use tracing::info;

use crate::domain::{FittedModel, ObservationTable, PipelineConfig};
use crate::error::AppError;
use crate::fit::{MixedModelFitter, ProfiledReml};
use crate::io::{load_observations, write_model_json, write_random_effects_csv};
use crate::plot::render_diagnostics;
use crate::report::{RandomEffectsTable, extract_random_effects, write_summary};

/// All computed outputs of a single `lmm fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: ObservationTable,
    pub model: FittedModel,
    pub random_effects: RandomEffectsTable,
}

/// Run the pipeline with the default estimator.
pub fn run(config: &PipelineConfig) -> Result<RunOutput, AppError> {
    let fitter = ProfiledReml::new(config.fit_options.clone());
    run_with_fitter(config, &fitter)
}

/// Run the pipeline with a caller-supplied estimator.
pub fn run_with_fitter<F>(config: &PipelineConfig, fitter: &F) -> Result<RunOutput, AppError>
where
    F: MixedModelFitter + ?Sized,
{
    // 1) Load.
    let table = load_observations(&config.data_path)?;
    info!(
        "Loaded {} observations in {} groups from '{}'",
        table.len(),
        table.groups().len(),
        config.data_path.display()
    );

    // 2) Fit.
    let model = fitter.fit(&table, &config.model_spec)?;

    // 3) Write outputs.
    let random_effects = extract_random_effects(&model, config.ci_strategy);
    let (summary, (reffs, diagnostics)) = join(
        || write_summary(&model, &config.summary_path),
        || {
            join(
                || write_random_effects_csv(&random_effects, &config.random_effects_path),
                || render_diagnostics(&model, &config.diagnostics_dir),
            )
        },
    );
    summary?;
    reffs?;
    diagnostics?;
    info!("Wrote summary to '{}'", config.summary_path.display());
    info!(
        "Wrote {} random effects to '{}'",
        random_effects.len(),
        config.random_effects_path.display()
    );
    info!("Wrote diagnostics to '{}'", config.diagnostics_dir.display());

    if let Some(path) = &config.export_model {
        write_model_json(&model, path)?;
        info!("Exported model to '{}'", path.display());
    }

    Ok(RunOutput {
        table,
        model,
        random_effects,
    })
}
