//! Ordinary least squares.
//!
//! Used for the Q–Q reference line and as the θ = 0 baseline of the mixed
//! model. Solved through SVD so tall and rank-deficient designs still return
//! the minimum-norm solution instead of panicking.

use nalgebra::{DMatrix, DVector};

/// Solve `min ||y - Xβ||²` using SVD.
///
/// Returns `None` if no finite solution is found at any tolerance.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = a + b x` and return `(slope, intercept)`.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let rhs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &rhs)?;
    Some((beta[1], beta[0]))
}

/// Residual sum of squares of the least-squares fit.
pub fn residual_sum_of_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<f64> {
    let beta = solve_least_squares(x, y)?;
    let r = y - x * beta;
    Some(r.dot(&r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn fit_line_returns_slope_then_intercept() {
        let (slope, intercept) = fit_line(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-10);
        assert!((intercept - 1.0).abs() < 1e-10);
    }

    #[test]
    fn fit_line_on_a_single_point_is_finite() {
        let (slope, intercept) = fit_line(&[0.0], &[4.0]).unwrap();
        assert!(slope.is_finite() && intercept.is_finite());
    }
}
