//! Start-value grid for the relative covariance factor θ.
//!
//! θ packs the lower triangle of the Cholesky factor `L` of `Γ = Ψ / σ²` row by
//! row: `[L00, L10, L11, L20, L21, L22, ...]`. The grid varies the diagonal
//! (a common relative standard deviation for every random-effect column) and
//! keeps off-diagonals at zero. The best grid point seeds the simplex search.

use crate::error::AppError;
use crate::math::Bounds;

/// Smallest positive grid value.
pub const GRID_MIN: f64 = 1e-3;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid grid range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Number of free entries in a `q × q` lower-triangular factor.
pub fn theta_len(q: usize) -> usize {
    q * (q + 1) / 2
}

/// Positions of the diagonal entries of `L` inside θ.
pub fn diagonal_positions(q: usize) -> Vec<usize> {
    (0..q).map(|i| i * (i + 1) / 2 + i).collect()
}

/// θ with every diagonal entry set to `value` and zero off-diagonals.
pub fn diagonal_theta(q: usize, value: f64) -> Vec<f64> {
    let mut theta = vec![0.0; theta_len(q)];
    for pos in diagonal_positions(q) {
        theta[pos] = value;
    }
    theta
}

/// Grid of start values: θ = 0 plus `steps` log-spaced diagonals up to `theta_max`.
pub fn theta_grid(q: usize, steps: usize, theta_max: f64) -> Result<Vec<Vec<f64>>, AppError> {
    let values = log_space(GRID_MIN, theta_max, steps)?;
    Ok(std::iter::once(0.0)
        .chain(values)
        .map(|v| diagonal_theta(q, v))
        .collect())
}

/// Box for θ: diagonals in `[0, theta_max]`, off-diagonals in `[-theta_max, theta_max]`.
pub fn theta_bounds(q: usize, theta_max: f64) -> Bounds {
    let n = theta_len(q);
    let diag = diagonal_positions(q);
    let lower = (0..n)
        .map(|i| if diag.contains(&i) { 0.0 } else { -theta_max })
        .collect();
    Bounds {
        lower,
        upper: vec![theta_max; n],
    }
}
