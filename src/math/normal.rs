//! Standard-normal helpers: Wald p-values and normal probability plots.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

use crate::math::fit_line;

/// Two-sided p-value of a standard-normal test statistic.
pub fn two_sided_p_value(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Data for a normal Q–Q plot.
#[derive(Debug, Clone)]
pub struct ProbPlot {
    /// Theoretical standard-normal quantiles (ascending).
    pub theoretical: Vec<f64>,
    /// Sample values sorted ascending.
    pub ordered: Vec<f64>,
    /// Least-squares reference line `ordered ≈ intercept + slope * theoretical`.
    pub slope: f64,
    pub intercept: f64,
}

/// Uniform order-statistic medians (Filliben's approximation).
pub fn order_statistic_medians(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let last = 0.5_f64.powf(1.0 / nf);
    let mut v: Vec<f64> = (1..=n).map(|i| (i as f64 - 0.3175) / (nf + 0.365)).collect();
    v[n - 1] = last;
    v[0] = 1.0 - last;
    v
}

/// Compute normal probability plot data for `values`.
///
/// Non-finite values are dropped before ordering.
pub fn normal_probplot(values: &[f64]) -> ProbPlot {
    let normal = Normal::standard();

    let mut ordered: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    ordered.sort_by(f64::total_cmp);

    let theoretical: Vec<f64> = order_statistic_medians(ordered.len())
        .into_iter()
        .map(|p| normal.inverse_cdf(p))
        .collect();

    let (slope, intercept) = fit_line(&theoretical, &ordered).unwrap_or((1.0, 0.0));

    ProbPlot {
        theoretical,
        ordered,
        slope,
        intercept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_values_match_known_points() {
        assert!((two_sided_p_value(0.0) - 1.0).abs() < 1e-12);
        assert!((two_sided_p_value(1.959963984540054) - 0.05).abs() < 1e-9);
        assert!((two_sided_p_value(-1.959963984540054) - 0.05).abs() < 1e-9);
        assert!(two_sided_p_value(40.0) >= 0.0);
    }

    #[test]
    fn order_statistic_medians_are_symmetric_and_increasing() {
        let m = order_statistic_medians(7);
        assert_eq!(m.len(), 7);
        for w in m.windows(2) {
            assert!(w[0] < w[1]);
        }
        for i in 0..7 {
            assert!((m[i] + m[6 - i] - 1.0).abs() < 1e-3);
        }
        assert_eq!(order_statistic_medians(1), vec![0.5]);
    }

    #[test]
    fn probplot_of_exact_quantiles_is_the_identity_line() {
        let normal = Normal::standard();
        let q: Vec<f64> = order_statistic_medians(25)
            .into_iter()
            .map(|p| 2.0 * normal.inverse_cdf(p) + 1.0)
            .collect();
        let pp = normal_probplot(&q);
        assert!((pp.slope - 2.0).abs() < 1e-9);
        assert!((pp.intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn probplot_of_no_values_is_empty() {
        let pp = normal_probplot(&[]);
        assert!(pp.theoretical.is_empty());
        assert!(pp.ordered.is_empty());
    }

    #[test]
    fn probplot_drops_non_finite_values() {
        let pp = normal_probplot(&[1.0, f64::NAN, -1.0, f64::INFINITY]);
        assert_eq!(pp.ordered, vec![-1.0, 1.0]);
        assert_eq!(pp.theoretical.len(), 2);
    }
}
