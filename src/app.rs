//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging and the worker pool
//! - resolves output paths
//! - runs the fit pipeline or the data simulator

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FitArgs, SimulateArgs};
use crate::data::{SimulationConfig, simulate};
use crate::domain::{FitOptions, ModelSpec, PipelineConfig};
use crate::error::AppError;
use crate::io::{resolve_root, write_observations_csv};
use crate::report::format_summary;

pub mod pipeline;

/// Entry point for the `lmm` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` may carry LMM_PROJECT_ROOT / RUST_LOG; a missing file is fine.
    let _ = dotenvy::dotenv();

    // `lmm` and `lmm --data x.csv` behave like `lmm fit ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);

    init_logging(cli.verbose);
    init_thread_pool(cli.threads)?;

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // A second initialisation (e.g. in tests) is not an error worth reporting.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn init_thread_pool(threads: Option<usize>) -> Result<(), AppError> {
    let Some(n) = threads else {
        return Ok(());
    };
    if n == 0 {
        return Err(AppError::config("--threads must be >= 1."));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global()
        .map_err(|e| AppError::config(format!("Failed to configure thread pool: {e}")))?;
    debug!("Using {n} worker threads");
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = pipeline_config_from_args(&args)?;
    let run = pipeline::run(&config)?;

    if args.print {
        println!("{}", format_summary(&run.model));
    }
    println!("summary:         {}", config.summary_path.display());
    println!("random effects:  {}", config.random_effects_path.display());
    println!("diagnostics:     {}", config.diagnostics_dir.display());
    if let Some(path) = &config.export_model {
        println!("model:           {}", path.display());
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let out = match &args.out {
        Some(path) => path.clone(),
        None => PipelineConfig::from_root(&resolve_root(args.root.as_deref())?).data_path,
    };
    let config = SimulationConfig {
        groups: args.groups,
        per_group: args.per_group,
        seed: args.seed,
        intercept: args.intercept,
        beta_rooms: args.beta_rooms,
        beta_age: args.beta_age,
        group_sd: args.group_sd,
        noise_sd: args.noise_sd,
    };
    let data = simulate(&config)?;
    write_observations_csv(&data.observations, &out)?;
    info!(
        "Simulated {} rows in {} groups (seed {})",
        data.observations.len(),
        config.groups,
        config.seed
    );
    println!("{}", out.display());
    Ok(())
}

/// Build the pipeline configuration: defaults from the project root, then
/// per-path overrides.
pub fn pipeline_config_from_args(args: &FitArgs) -> Result<PipelineConfig, AppError> {
    if !(args.tol.is_finite() && args.tol > 0.0) {
        return Err(AppError::config("--tol must be a positive number."));
    }
    if args.max_iter == Some(0) {
        return Err(AppError::config("--max-iter must be >= 1."));
    }

    let root = resolve_root(args.root.as_deref())?;
    let mut config = PipelineConfig::from_root(&root);

    if let Some(p) = &args.data {
        config.data_path = p.clone();
    }
    if let Some(p) = &args.summary {
        config.summary_path = p.clone();
    }
    if let Some(p) = &args.reffs {
        config.random_effects_path = p.clone();
    }
    if let Some(p) = &args.diagnostics_dir {
        config.diagnostics_dir = p.clone();
    }
    config.export_model = args.export_model.clone();

    let mut random_slopes = Vec::new();
    for p in &args.random_slopes {
        if !random_slopes.contains(p) {
            random_slopes.push(*p);
        }
    }
    config.model_spec = ModelSpec {
        random_slopes,
        method: args.method,
        ..ModelSpec::default()
    };
    config.fit_options = FitOptions {
        max_iter: args.max_iter,
        tol: args.tol,
        grid_steps: args.grid_steps,
        ..FitOptions::default()
    };
    config.ci_strategy = args.ci;

    Ok(config)
}

/// Rewrite argv so `lmm` defaults to `lmm fit`.
///
/// Rules:
/// - `lmm`                      -> `lmm fit`
/// - `lmm --data x.csv ...`     -> `lmm fit --data x.csv ...`
/// - `lmm -v simulate ...`      -> unchanged (a subcommand is present)
/// - `lmm --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version =
        matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let has_subcommand = argv[1..]
        .iter()
        .any(|a| matches!(a.as_str(), "fit" | "simulate" | "help"));
    if has_subcommand {
        return argv;
    }

    // Only flags were given: treat them as `fit` flags.
    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_runs_fit() {
        assert_eq!(rewrite_args(args(&["lmm"])), args(&["lmm", "fit"]));
        assert_eq!(
            rewrite_args(args(&["lmm", "--data", "x.csv"])),
            args(&["lmm", "fit", "--data", "x.csv"])
        );
    }

    #[test]
    fn explicit_subcommands_and_help_are_untouched() {
        for v in [
            args(&["lmm", "simulate", "--groups", "3"]),
            args(&["lmm", "-v", "simulate"]),
            args(&["lmm", "--help"]),
            args(&["lmm", "fit", "--print"]),
        ] {
            assert_eq!(rewrite_args(v.clone()), v);
        }
    }

    #[test]
    fn path_overrides_apply_on_top_of_root_defaults() {
        let cli = Cli::parse_from([
            "lmm",
            "fit",
            "--root",
            "/proj",
            "--reffs",
            "/elsewhere/r.csv",
            "--random-slope",
            "age",
            "--random-slope",
            "age",
        ]);
        let Command::Fit(fit) = cli.command else {
            panic!("expected fit");
        };
        let config = pipeline_config_from_args(&fit).unwrap();
        assert_eq!(
            config.data_path,
            std::path::Path::new("/proj/data_cache/la_energy.csv")
        );
        assert_eq!(config.random_effects_path, std::path::Path::new("/elsewhere/r.csv"));
        assert_eq!(config.model_spec.random_slopes.len(), 1);
    }

    #[test]
    fn invalid_tolerance_is_a_config_error() {
        let cli = Cli::parse_from(["lmm", "fit", "--root", "/proj", "--tol", "0"]);
        let Command::Fit(fit) = cli.command else {
            panic!("expected fit");
        };
        let err = pipeline_config_from_args(&fit).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn iteration_budget_is_automatic_unless_given() {
        let fit_args = |extra: &[&str]| {
            let mut argv = vec!["lmm", "fit", "--root", "/proj"];
            argv.extend_from_slice(extra);
            match Cli::parse_from(argv).command {
                Command::Fit(fit) => fit,
                _ => panic!("expected fit"),
            }
        };

        let auto = pipeline_config_from_args(&fit_args(&[])).unwrap();
        assert_eq!(auto.fit_options.max_iter, None);

        let fixed = pipeline_config_from_args(&fit_args(&["--max-iter", "50"])).unwrap();
        assert_eq!(fixed.fit_options.max_iter, Some(50));

        let err = pipeline_config_from_args(&fit_args(&["--max-iter", "0"])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
