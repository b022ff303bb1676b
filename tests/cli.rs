//! CLI tests for the `lmm` binary.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn simulate_then_fit_writes_every_output() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    cargo_bin_cmd!("lmm")
        .args(["simulate", "--groups", "8", "--per-group", "12", "--seed", "3", "--root"])
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("la_energy.csv"));

    let model_json = root.join("model.json");
    cargo_bin_cmd!("lmm")
        .arg("fit")
        .arg("--root")
        .arg(root)
        .arg("--export-model")
        .arg(&model_json)
        .arg("--print")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mixed Linear Model Regression Results"));

    let cache = root.join("data_cache");
    assert!(cache.join("vignettes/regression/model_fit.txt").is_file());
    assert!(cache.join("models/reffs.csv").is_file());
    for name in ["residuals_vs_fitted.png", "qq_plot.png", "scale_location.png"] {
        assert!(cache.join("models/diagnostics").join(name).is_file(), "{name}");
    }
    assert!(model_json.is_file());
}

#[test]
fn fit_is_the_default_subcommand() {
    let tmp = TempDir::new().unwrap();
    cargo_bin_cmd!("lmm")
        .args(["simulate", "--groups", "4", "--per-group", "6", "--root"])
        .arg(tmp.path())
        .assert()
        .success();

    cargo_bin_cmd!("lmm")
        .arg("--root")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("reffs.csv"));
}

#[test]
fn missing_data_file_exits_with_data_load_code() {
    let tmp = TempDir::new().unwrap();
    cargo_bin_cmd!("lmm")
        .arg("fit")
        .arg("--root")
        .arg(tmp.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("data load error"));
}

#[test]
fn invalid_thread_count_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    cargo_bin_cmd!("lmm")
        .args(["fit", "--threads", "0", "--root"])
        .arg(tmp.path())
        .assert()
        .code(2);
}
