//! Shared domain types.
//!
//! These types flow through every stage of the pipeline:
//!
//! - observations produced by ingest and consumed by the fitter
//! - the fitted model consumed (read-only) by the three output writers
//! - run configuration assembled from CLI flags and the project root

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Name of the response column.
pub const RESPONSE: &str = "shortfall";

/// Name of the grouping column.
pub const GROUP_COLUMN: &str = "local_authority_code";

/// A numeric predictor column available to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Predictor {
    #[value(name = "n_rooms")]
    NRooms,
    Age,
}

impl Predictor {
    /// Column name as it appears in the input CSV and in reports.
    pub fn column(self) -> &'static str {
        match self {
            Predictor::NRooms => "n_rooms",
            Predictor::Age => "age",
        }
    }

    pub fn value(self, obs: &Observation) -> f64 {
        match self {
            Predictor::NRooms => obs.n_rooms,
            Predictor::Age => obs.age,
        }
    }
}

/// Likelihood used for variance-component estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Restricted maximum likelihood.
    Reml,
    /// Full maximum likelihood.
    Ml,
}

impl FitMethod {
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::Reml => "REML",
            FitMethod::Ml => "ML",
        }
    }
}

/// Which standard error feeds the random-intercept confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CiStrategy {
    /// `sqrt(cov_re[0,0])`, shared by every group.
    Global,
    /// Per-group conditional standard error of the predicted intercept.
    Conditional,
}

/// One record of the input table.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub shortfall: f64,
    pub n_rooms: f64,
    pub age: f64,
    /// Grouping identifier (`local_authority_code`); never empty.
    pub group: String,
}

/// A row-level problem encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Loaded input: the observations that passed validation plus what was skipped.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    pub observations: Vec<Observation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl ObservationTable {
    pub fn from_observations(observations: Vec<Observation>) -> Self {
        let rows_read = observations.len();
        Self {
            observations,
            row_errors: Vec::new(),
            rows_read,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct group identifiers in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.observations
            .iter()
            .map(|o| o.group.as_str())
            .filter(|g| seen.insert(*g))
            .collect()
    }
}

/// Model formula: `shortfall ~ fixed` with a random intercept (and optional
/// random slopes) per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub fixed: Vec<Predictor>,
    pub random_slopes: Vec<Predictor>,
    pub method: FitMethod,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            fixed: vec![Predictor::NRooms, Predictor::Age],
            random_slopes: Vec::new(),
            method: FitMethod::Reml,
        }
    }
}

impl ModelSpec {
    /// Number of fixed-effect columns (intercept included).
    pub fn fixed_len(&self) -> usize {
        1 + self.fixed.len()
    }

    /// Number of random-effect columns per group (intercept included).
    pub fn random_len(&self) -> usize {
        1 + self.random_slopes.len()
    }

    pub fn fixed_names(&self) -> Vec<String> {
        std::iter::once("Intercept".to_string())
            .chain(self.fixed.iter().map(|p| p.column().to_string()))
            .collect()
    }

    /// Human-readable formula, e.g. `shortfall ~ n_rooms + age`.
    pub fn formula(&self) -> String {
        if self.fixed.is_empty() {
            return format!("{RESPONSE} ~ 1");
        }
        let terms: Vec<&str> = self.fixed.iter().map(|p| p.column()).collect();
        format!("{RESPONSE} ~ {}", terms.join(" + "))
    }
}

/// Per-group random effect: intercept plus one slope per random-slope predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomEffect {
    pub intercept: f64,
    pub slopes: Vec<f64>,
}

/// Random effect of a single group, with its conditional intercept variance.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEffect {
    pub group: String,
    pub effect: RandomEffect,
    /// Conditional variance of the predicted intercept, `Var(b_0 | y)`.
    pub intercept_cond_var: f64,
    pub size: usize,
}

/// Output of the model fitter. Immutable once produced.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub method: FitMethod,
    pub formula: String,
    pub fixed_names: Vec<String>,
    pub fixed_effects: Vec<f64>,
    /// Covariance matrix of the fixed-effect estimates.
    pub fixed_cov: DMatrix<f64>,
    /// Names of the random-slope predictors (intercept excluded).
    pub slope_names: Vec<String>,
    /// Residual variance σ².
    pub scale: f64,
    /// Covariance matrix of the random effects (intercept first).
    pub cov_re: DMatrix<f64>,
    /// Random effects per group, in first-seen group order.
    pub random_effects: Vec<GroupEffect>,
    /// Conditional fitted values `Xβ + Zb`, one per observation.
    pub fitted: Vec<f64>,
    /// `y - fitted`, one per observation.
    pub residuals: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
    pub n_obs: usize,
}

impl FittedModel {
    pub fn n_groups(&self) -> usize {
        self.random_effects.len()
    }

    pub fn random_effect(&self, group: &str) -> Option<&RandomEffect> {
        self.random_effects
            .iter()
            .find(|g| g.group == group)
            .map(|g| &g.effect)
    }

    /// Standard errors of the fixed effects.
    pub fn fixed_std_errors(&self) -> Vec<f64> {
        (0..self.fixed_effects.len())
            .map(|i| self.fixed_cov[(i, i)].max(0.0).sqrt())
            .collect()
    }

    /// `(min, max, mean)` group size.
    pub fn group_size_stats(&self) -> (usize, usize, f64) {
        let sizes = self.random_effects.iter().map(|g| g.size);
        let min = sizes.clone().min().unwrap_or(0);
        let max = sizes.clone().max().unwrap_or(0);
        let total: usize = sizes.sum();
        let mean = if self.random_effects.is_empty() {
            0.0
        } else {
            total as f64 / self.random_effects.len() as f64
        };
        (min, max, mean)
    }
}

/// Numerical controls for the mixed-model optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Maximum Nelder–Mead iterations per simplex run; `None` scales the
    /// budget with the number of covariance parameters.
    pub max_iter: Option<usize>,
    /// Relative tolerance on the deviance spread of the simplex.
    pub tol: f64,
    /// Number of log-spaced start values tried before refinement.
    pub grid_steps: usize,
    /// Upper bound on the relative random-effect standard deviation (σ_b / σ).
    pub theta_max: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: None,
            tol: 1e-8,
            grid_steps: 25,
            theta_max: 1e3,
        }
    }
}

/// Iterations per covariance parameter when no explicit budget is set.
const ITERATIONS_PER_PARAMETER: usize = 200;
/// Floor for the automatic budget.
const MIN_ITERATIONS: usize = 500;

impl FitOptions {
    /// Simplex iteration budget for `n_params` covariance parameters.
    pub fn iteration_budget(&self, n_params: usize) -> usize {
        self.max_iter
            .unwrap_or_else(|| (ITERATIONS_PER_PARAMETER * n_params).max(MIN_ITERATIONS))
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// Paths are explicit values so tests can redirect every output.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub summary_path: PathBuf,
    pub random_effects_path: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub export_model: Option<PathBuf>,
    pub model_spec: ModelSpec,
    pub fit_options: FitOptions,
    pub ci_strategy: CiStrategy,
}

impl PipelineConfig {
    /// Default layout under a project root:
    ///
    /// - `data_cache/la_energy.csv`
    /// - `data_cache/vignettes/regression/model_fit.txt`
    /// - `data_cache/models/reffs.csv`
    /// - `data_cache/models/diagnostics/`
    pub fn from_root(root: &Path) -> Self {
        let cache = root.join("data_cache");
        let models = cache.join("models");
        Self {
            data_path: cache.join("la_energy.csv"),
            summary_path: cache.join("vignettes").join("regression").join("model_fit.txt"),
            random_effects_path: models.join("reffs.csv"),
            diagnostics_dir: models.join("diagnostics"),
            export_model: None,
            model_spec: ModelSpec::default(),
            fit_options: FitOptions::default(),
            ci_strategy: CiStrategy::Global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_matches_vignette_formula() {
        let spec = ModelSpec::default();
        assert_eq!(spec.formula(), "shortfall ~ n_rooms + age");
        assert_eq!(spec.fixed_names(), vec!["Intercept", "n_rooms", "age"]);
        assert_eq!(spec.random_len(), 1);
    }

    #[test]
    fn iteration_budget_grows_with_parameter_count() {
        let auto = FitOptions::default();
        assert_eq!(auto.iteration_budget(1), 500);
        assert_eq!(auto.iteration_budget(6), 1200);

        let fixed = FitOptions {
            max_iter: Some(50),
            ..FitOptions::default()
        };
        assert_eq!(fixed.iteration_budget(6), 50);
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let obs = |g: &str| Observation {
            shortfall: 0.0,
            n_rooms: 1.0,
            age: 1.0,
            group: g.to_string(),
        };
        let table = ObservationTable::from_observations(vec![obs("B"), obs("A"), obs("B"), obs("C")]);
        assert_eq!(table.groups(), vec!["B", "A", "C"]);
    }

    #[test]
    fn from_root_lays_out_outputs_under_data_cache() {
        let cfg = PipelineConfig::from_root(Path::new("/proj"));
        assert_eq!(cfg.data_path, Path::new("/proj/data_cache/la_energy.csv"));
        assert_eq!(cfg.random_effects_path, Path::new("/proj/data_cache/models/reffs.csv"));
        assert!(cfg.summary_path.ends_with("vignettes/regression/model_fit.txt"));
        assert!(cfg.diagnostics_dir.ends_with("models/diagnostics"));
    }
}
