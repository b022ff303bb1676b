//! Text summary of a fitted mixed model.
//!
//! Layout follows the familiar "Mixed Linear Model Regression Results" table:
//! a two-column header block, then one row per fixed effect and one row per
//! variance component. Output is a pure function of the model so repeated runs
//! produce identical bytes.

use std::fs;
use std::path::Path;

use crate::domain::{FittedModel, RESPONSE};
use crate::error::AppError;
use crate::io::ensure_parent_dir;
use crate::math::two_sided_p_value;
use crate::report::Z_95;

const WIDTH: usize = 72;
const NAME_WIDTH: usize = 24;

/// Render the summary report.
pub fn format_summary(model: &FittedModel) -> String {
    let mut out = String::new();
    let (min_size, max_size, mean_size) = model.group_size_stats();

    out.push_str(&center("Mixed Linear Model Regression Results", WIDTH));
    out.push('\n');
    out.push_str(&"=".repeat(WIDTH));
    out.push('\n');

    let converged = if model.converged { "Yes" } else { "No" };
    let header = [
        ("Model:", "MixedLM".to_string(), "Dependent Variable:", RESPONSE.to_string()),
        (
            "No. Observations:",
            model.n_obs.to_string(),
            "Method:",
            model.method.display_name().to_string(),
        ),
        (
            "No. Groups:",
            model.n_groups().to_string(),
            "Scale:",
            format!("{:.4}", model.scale),
        ),
        (
            "Min. group size:",
            min_size.to_string(),
            "Log-Likelihood:",
            format!("{:.4}", model.log_likelihood),
        ),
        (
            "Max. group size:",
            max_size.to_string(),
            "Converged:",
            converged.to_string(),
        ),
        (
            "Mean group size:",
            format!("{mean_size:.1}"),
            "Iterations:",
            model.iterations.to_string(),
        ),
    ];
    for (l_key, l_val, r_key, r_val) in header {
        let line = format!("{l_key:<18}{l_val:<16}{r_key:<20}{r_val:>18}");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("Formula: {}\n", model.formula));

    out.push_str(&"-".repeat(WIDTH));
    out.push('\n');
    let columns = format!(
        "{:<NAME_WIDTH$}{:>8}{:>10}{:>8}{:>8}{:>7}{:>7}",
        "", "Coef.", "Std.Err.", "z", "P>|z|", "[0.025", "0.975]"
    );
    out.push_str(columns.trim_end());
    out.push('\n');
    out.push_str(&"-".repeat(WIDTH));
    out.push('\n');

    let std_errors = model.fixed_std_errors();
    for ((name, &coef), &se) in model
        .fixed_names
        .iter()
        .zip(&model.fixed_effects)
        .zip(&std_errors)
    {
        let z = if se > 0.0 { coef / se } else { f64::NAN };
        let p = two_sided_p_value(z);
        let line = format!(
            "{:<NAME_WIDTH$}{:>8}{:>10}{:>8}{:>8}{:>7}{:>7}",
            truncate(name, NAME_WIDTH - 1),
            fmt_num(coef),
            fmt_num(se),
            fmt_stat(z, 3),
            fmt_stat(p, 3),
            fmt_num(coef - Z_95 * se),
            fmt_num(coef + Z_95 * se),
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }

    for (name, value) in variance_components(model) {
        let line = format!("{:<NAME_WIDTH$}{:>8}", truncate(&name, NAME_WIDTH - 1), fmt_num(value));
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out.push_str(&"=".repeat(WIDTH));
    out.push('\n');
    out
}

/// Write the summary to `path`, creating parent directories as needed.
pub fn write_summary(model: &FittedModel, path: &Path) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    fs::write(path, format_summary(model))
        .map_err(|e| AppError::io(format!("Failed to write summary '{}': {e}", path.display())))
}

/// Variance-component rows, lower triangle of `cov_re` in row order.
///
/// `(0,0)` is `Group Var`; intercept/slope covariances are `Group x <slope> Cov`;
/// slope variances are `<slope> Var`.
fn variance_components(model: &FittedModel) -> Vec<(String, f64)> {
    let label = |i: usize| component_label(model, i);
    let q = model.cov_re.nrows();
    let mut rows = Vec::with_capacity(q * (q + 1) / 2);
    for i in 0..q {
        for j in 0..=i {
            let name = if i == j {
                format!("{} Var", label(i))
            } else {
                format!("{} x {} Cov", label(j), label(i))
            };
            rows.push((name, model.cov_re[(i, j)]));
        }
    }
    rows
}

/// `Group` for the intercept column, else the slope's predictor name.
fn component_label(model: &FittedModel, i: usize) -> &str {
    match i {
        0 => "Group",
        _ => model.slope_names.get(i - 1).map(String::as_str).unwrap_or("?"),
    }
}

fn fmt_num(v: f64) -> String {
    if v.is_finite() { format!("{v:.3}") } else { String::new() }
}

fn fmt_stat(v: f64, decimals: usize) -> String {
    if v.is_finite() { format!("{v:.decimals$}") } else { String::new() }
}

fn center(s: &str, width: usize) -> String {
    let pad = width.saturating_sub(s.chars().count()) / 2;
    format!("{}{s}", " ".repeat(pad))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_model;
    use nalgebra::DMatrix;

    #[test]
    fn summary_contains_header_and_coefficient_rows() {
        let text = format_summary(&sample_model());
        assert!(text.contains("Mixed Linear Model Regression Results"));
        assert!(text.contains("Dependent Variable:"));
        assert!(text.contains("shortfall"));
        assert!(text.contains("No. Groups:"));
        assert!(text.contains("REML"));
        assert!(text.contains("P>|z|"));
        assert!(text.contains("[0.025"));

        let intercept = text.lines().find(|l| l.starts_with("Intercept")).unwrap();
        assert!(intercept.contains("10.000"));
        assert!(intercept.contains("0.500"));
        // z = 10 / 0.5
        assert!(intercept.contains("20.000"));
        assert!(text.lines().any(|l| l.starts_with("Group Var")));
    }

    #[test]
    fn summary_is_deterministic() {
        let m = sample_model();
        assert_eq!(format_summary(&m), format_summary(&m));
    }

    #[test]
    fn slope_components_are_named() {
        let mut m = sample_model();
        m.slope_names = vec!["n_rooms".to_string()];
        m.cov_re = DMatrix::from_row_slice(2, 2, &[0.4, 0.1, 0.1, 0.2]);
        let names: Vec<String> = variance_components(&m).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Group Var", "Group x n_rooms Cov", "n_rooms Var"]);
    }

    #[test]
    fn zero_standard_error_leaves_test_columns_blank() {
        let mut m = sample_model();
        m.fixed_cov = DMatrix::zeros(3, 3);
        let text = format_summary(&m);
        let intercept = text.lines().find(|l| l.starts_with("Intercept")).unwrap();
        assert!(!intercept.contains("NaN"));
    }

    #[test]
    fn unwritable_summary_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("vignettes");
        fs::write(&blocker, "not a directory").unwrap();

        let err = write_summary(&sample_model(), &blocker.join("model_fit.txt")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn write_summary_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vignettes").join("regression").join("model_fit.txt");
        write_summary(&sample_model(), &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, format_summary(&sample_model()));
    }
}
