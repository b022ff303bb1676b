//! Design rows for the mixed model.
//!
//! The fitter relies on three primitive operations:
//! - build the fixed-effect row `x` for an observation (for β)
//! - build the random-effect row `z` for an observation (for b)
//! - predict `xβ + zb` given estimates (for fitted values/residuals)
//!
//! Both rows carry the constant term first (intercept).

use crate::domain::{ModelSpec, Observation, RandomEffect};

/// Fill the fixed-effect design row.
///
/// # Panics
/// Panics if `out` is shorter than `spec.fixed_len()`.
pub fn fill_fixed_row(spec: &ModelSpec, obs: &Observation, out: &mut [f64]) {
    out[0] = 1.0;
    for (slot, p) in out[1..].iter_mut().zip(&spec.fixed) {
        *slot = p.value(obs);
    }
}

/// Fill the random-effect design row.
///
/// # Panics
/// Panics if `out` is shorter than `spec.random_len()`.
pub fn fill_random_row(spec: &ModelSpec, obs: &Observation, out: &mut [f64]) {
    out[0] = 1.0;
    for (slot, p) in out[1..].iter_mut().zip(&spec.random_slopes) {
        *slot = p.value(obs);
    }
}

/// Conditional prediction `xβ + zb` for one observation.
pub fn predict(spec: &ModelSpec, obs: &Observation, fixed: &[f64], effect: &RandomEffect) -> f64 {
    let fixed_part = fixed[0]
        + spec
            .fixed
            .iter()
            .zip(&fixed[1..])
            .map(|(p, b)| p.value(obs) * b)
            .sum::<f64>();
    let random_part = effect.intercept
        + spec
            .random_slopes
            .iter()
            .zip(&effect.slopes)
            .map(|(p, b)| p.value(obs) * b)
            .sum::<f64>();
    fixed_part + random_part
}
