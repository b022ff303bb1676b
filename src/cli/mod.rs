//! Command-line parsing for the mixed-model vignette.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling and output code.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::{CiStrategy, FitMethod, Predictor};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "lmm",
    version,
    about = "Linear mixed-model fit of dwelling energy shortfall by local authority"
)]
pub struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Worker threads for the parallel stages (default: one per core).
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the model and write the summary, random effects and diagnostics.
    Fit(FitArgs),
    /// Write a synthetic dataset with known parameters.
    Simulate(SimulateArgs),
}

/// Options for `lmm fit`.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Project root; defaults are resolved from `LMM_PROJECT_ROOT` or the nearest
    /// ancestor holding `data_cache/` or `.git`.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Input CSV (default: <root>/data_cache/la_energy.csv).
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Summary text file (default: <root>/data_cache/vignettes/regression/model_fit.txt).
    #[arg(long, value_name = "TXT")]
    pub summary: Option<PathBuf>,

    /// Random-effects CSV (default: <root>/data_cache/models/reffs.csv).
    #[arg(long, value_name = "CSV")]
    pub reffs: Option<PathBuf>,

    /// Directory for the diagnostic PNGs (default: <root>/data_cache/models/diagnostics).
    #[arg(long = "diagnostics-dir", value_name = "DIR")]
    pub diagnostics_dir: Option<PathBuf>,

    /// Also export the fitted model as JSON.
    #[arg(long = "export-model", value_name = "JSON")]
    pub export_model: Option<PathBuf>,

    /// Likelihood used for the variance components.
    #[arg(long, value_enum, default_value_t = FitMethod::Reml)]
    pub method: FitMethod,

    /// Add a random slope for a predictor (repeatable).
    #[arg(long = "random-slope", value_enum, value_name = "COL")]
    pub random_slopes: Vec<Predictor>,

    /// Standard error used for the random-intercept intervals.
    #[arg(long, value_enum, default_value_t = CiStrategy::Global)]
    pub ci: CiStrategy,

    /// Maximum optimizer iterations (default: 200 per covariance parameter, at least 500).
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Relative deviance tolerance for convergence.
    #[arg(long, default_value_t = 1e-8)]
    pub tol: f64,

    /// Start-value grid size.
    #[arg(long, default_value_t = 25)]
    pub grid_steps: usize,

    /// Print the summary to stdout as well.
    #[arg(long)]
    pub print: bool,
}

/// Options for `lmm simulate`.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output CSV (default: <root>/data_cache/la_energy.csv).
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,

    /// Project root used for the default output path.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Number of local authorities.
    #[arg(long, default_value_t = 40)]
    pub groups: usize,

    /// Dwellings per local authority.
    #[arg(long, default_value_t = 25)]
    pub per_group: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// True fixed intercept.
    #[arg(long, default_value_t = 2.0, allow_hyphen_values = true)]
    pub intercept: f64,

    /// True `n_rooms` coefficient.
    #[arg(long, default_value_t = 0.8, allow_hyphen_values = true)]
    pub beta_rooms: f64,

    /// True `age` coefficient.
    #[arg(long, default_value_t = 0.02, allow_hyphen_values = true)]
    pub beta_age: f64,

    /// Standard deviation of the local-authority intercepts.
    #[arg(long, default_value_t = 1.0)]
    pub group_sd: f64,

    /// Standard deviation of the dwelling-level noise.
    #[arg(long, default_value_t = 0.5)]
    pub noise_sd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_flags_parse() {
        let cli = Cli::parse_from([
            "lmm",
            "-vv",
            "fit",
            "--method",
            "ml",
            "--random-slope",
            "n_rooms",
            "--random-slope",
            "age",
            "--ci",
            "conditional",
            "--threads",
            "2",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(2));
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.method, FitMethod::Ml);
        assert_eq!(args.random_slopes, vec![Predictor::NRooms, Predictor::Age]);
        assert_eq!(args.ci, CiStrategy::Conditional);
        assert!(args.root.is_none());
    }

    #[test]
    fn simulate_accepts_negative_coefficients() {
        let cli = Cli::parse_from(["lmm", "simulate", "--beta-age", "-0.1", "--groups", "5"]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.beta_age, -0.1);
        assert_eq!(args.groups, 5);
    }
}
