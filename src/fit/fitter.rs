//! Mixed-model estimation.
//!
//! Given an observation table and a model spec we:
//! - precompute per-group cross products (`DesignBlocks`)
//! - evaluate the profiled deviance on a θ grid (parallel)
//! - refine the best grid point with a box-constrained simplex search
//! - assemble fixed effects, variance components and per-group predictions
//!
//! The estimator sits behind [`MixedModelFitter`] so the pipeline can be driven
//! by a stub in tests.

use nalgebra::DVector;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    FitMethod, FitOptions, FittedModel, GroupEffect, ModelSpec, ObservationTable, RandomEffect,
};
use crate::error::AppError;
use crate::fit::grid::{diagonal_positions, theta_bounds, theta_grid, theta_len};
use crate::fit::reml::{DesignBlocks, Profile, lower_factor};
use crate::math::{NelderMeadOptions, nelder_mead};
use crate::models::predict;

/// Anything that can turn an observation table into a fitted mixed model.
pub trait MixedModelFitter {
    fn fit(&self, table: &ObservationTable, spec: &ModelSpec) -> Result<FittedModel, AppError>;
}

/// Profiled REML/ML estimator (grid start + Nelder–Mead).
#[derive(Debug, Clone, Default)]
pub struct ProfiledReml {
    pub options: FitOptions,
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    theta: Vec<f64>,
    deviance: f64,
}

impl ProfiledReml {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

impl MixedModelFitter for ProfiledReml {
    fn fit(&self, table: &ObservationTable, spec: &ModelSpec) -> Result<FittedModel, AppError> {
        validate(table, spec)?;

        let blocks = DesignBlocks::build(table, spec);
        let method = spec.method;
        info!(
            "Fitting {} by {} (n={}, groups={}, random columns={})",
            spec.formula(),
            method.display_name(),
            blocks.n,
            blocks.groups.len(),
            blocks.q
        );
        if blocks.groups.len() == 1 {
            warn!("Only one group present; random-effect variances are fixed at zero.");
            let theta = vec![0.0; theta_len(blocks.q)];
            let profile = blocks.profile(&theta, method).ok_or_else(|| {
                AppError::convergence("Deviance is not finite; the fixed-effect design may be singular.")
            })?;
            return assemble(table, spec, &blocks, &theta, &profile, 0);
        }

        let grid = theta_grid(blocks.q, self.options.grid_steps, self.options.theta_max)?;
        let start = best_grid_point(&blocks, &grid, method)?;
        debug!(
            "Grid start: theta={:?} deviance={:.6}",
            start.theta, start.deviance
        );

        let bounds = theta_bounds(blocks.q, self.options.theta_max);
        let nm_opts = NelderMeadOptions {
            max_iter: self.options.iteration_budget(start.theta.len()),
            f_tol: self.options.tol,
            ..NelderMeadOptions::default()
        };
        let objective = |t: &[f64]| blocks.deviance(t, method);
        let mut minimum = nelder_mead(objective, &start.theta, &bounds, &nm_opts);
        if !minimum.converged {
            // One restart with a fresh simplex around the best point so far.
            debug!(
                "Simplex stalled after {} iterations (deviance {:.6}); restarting",
                minimum.iterations, minimum.value
            );
            let spent = minimum.iterations;
            minimum = nelder_mead(objective, &minimum.x, &bounds, &nm_opts);
            minimum.iterations += spent;
        }

        if !minimum.converged {
            return Err(AppError::convergence(format!(
                "Optimizer did not converge after {} iterations (deviance {:.6}).",
                minimum.iterations, minimum.value
            )));
        }
        debug!(
            "Simplex converged in {} iterations: theta={:?} deviance={:.6}",
            minimum.iterations, minimum.x, minimum.value
        );

        let at_bound = diagonal_positions(blocks.q)
            .into_iter()
            .any(|pos| minimum.x[pos] >= self.options.theta_max);
        if at_bound {
            warn!(
                "Random-effect scale reached its upper bound (theta_max={}); the model may be degenerate.",
                self.options.theta_max
            );
        }

        let profile = blocks.profile(&minimum.x, method).ok_or_else(|| {
            AppError::convergence("Deviance is not finite at the optimum.")
        })?;

        let model = assemble(table, spec, &blocks, &minimum.x, &profile, minimum.iterations)?;
        info!(
            "Fit complete: log-likelihood={:.4}, scale={:.6}, group var={:.6}",
            model.log_likelihood,
            model.scale,
            model.cov_re[(0, 0)]
        );
        Ok(model)
    }
}

fn validate(table: &ObservationTable, spec: &ModelSpec) -> Result<(), AppError> {
    let p = spec.fixed_len();
    if table.len() <= p {
        return Err(AppError::convergence(format!(
            "Need more than {p} observations to estimate {p} fixed effects (got {}).",
            table.len()
        )));
    }
    let non_finite = table.observations.iter().any(|o| {
        !(o.shortfall.is_finite() && o.n_rooms.is_finite() && o.age.is_finite())
    });
    if non_finite {
        return Err(AppError::convergence("Observation table contains non-finite values."));
    }
    if table.observations.iter().any(|o| o.group.is_empty()) {
        return Err(AppError::convergence("Observation table contains an empty group identifier."));
    }
    Ok(())
}

fn best_grid_point(
    blocks: &DesignBlocks,
    grid: &[Vec<f64>],
    method: FitMethod,
) -> Result<Candidate, AppError> {
    let candidates: Vec<Candidate> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, theta)| {
            let deviance = blocks.deviance(theta, method);
            deviance.is_finite().then(|| Candidate {
                idx,
                theta: theta.clone(),
                deviance,
            })
        })
        .collect();

    if candidates.is_empty() {
        return Err(AppError::convergence(
            "Deviance is not finite at any start value; the fixed-effect design may be singular.",
        ));
    }

    // Deterministic selection: minimum deviance, ties broken by grid index.
    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.deviance < best.deviance || (c.deviance == best.deviance && c.idx < best.idx) {
            best = c;
        }
    }
    Ok(best.clone())
}

/// Build the fitted model at a fixed θ.
pub(crate) fn assemble(
    table: &ObservationTable,
    spec: &ModelSpec,
    blocks: &DesignBlocks,
    theta: &[f64],
    profile: &Profile,
    iterations: usize,
) -> Result<FittedModel, AppError> {
    let sigma2 = profile.sigma2;
    let l = lower_factor(theta, blocks.q);

    let xvx_inv = profile
        .xvx
        .clone()
        .cholesky()
        .ok_or_else(|| AppError::convergence("Fixed-effect information matrix is singular."))?
        .inverse();
    let fixed_cov = xvx_inv * sigma2;
    let cov_re = &l * l.transpose() * sigma2;

    let mut random_effects = Vec::with_capacity(blocks.groups.len());
    for block in &blocks.groups {
        let chol = block.m_cholesky(&l).ok_or_else(|| {
            AppError::convergence(format!("Random-effect system for group '{}' is singular.", block.name))
        })?;
        let zr: DVector<f64> = &block.zty - &block.ztx * &profile.beta;
        let b = &l * chol.solve(&(l.transpose() * zr));
        let cond_cov = &l * chol.inverse() * l.transpose() * sigma2;

        random_effects.push(GroupEffect {
            group: block.name.clone(),
            effect: RandomEffect {
                intercept: b[0],
                slopes: b.iter().skip(1).copied().collect(),
            },
            intercept_cond_var: cond_cov[(0, 0)],
            size: block.size,
        });
    }

    let beta: Vec<f64> = profile.beta.iter().copied().collect();
    let mut fitted = Vec::with_capacity(table.len());
    let mut residuals = Vec::with_capacity(table.len());
    for (obs, &g) in table.observations.iter().zip(&blocks.group_of) {
        let y_fit = predict(spec, obs, &beta, &random_effects[g].effect);
        fitted.push(y_fit);
        residuals.push(obs.shortfall - y_fit);
    }

    Ok(FittedModel {
        method: spec.method,
        formula: spec.formula(),
        fixed_names: spec.fixed_names(),
        fixed_effects: beta,
        fixed_cov,
        slope_names: spec
            .random_slopes
            .iter()
            .map(|p| p.column().to_string())
            .collect(),
        scale: sigma2,
        cov_re,
        random_effects,
        fitted,
        residuals,
        log_likelihood: -profile.deviance / 2.0,
        converged: true,
        iterations,
        n_obs: table.len(),
    })
}
