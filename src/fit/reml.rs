//! Profiled (restricted) likelihood of a linear mixed model with grouped
//! random effects.
//!
//! Model, per group `i`:
//!
//! ```text
//! y_i = X_i β + Z_i b_i + ε_i,   b_i ~ N(0, σ² Γ),   ε_i ~ N(0, σ² I),   Γ = L Lᵀ
//! ```
//!
//! For a given θ (the entries of `L`) both β and σ² have closed forms, so the
//! optimizer only searches over θ. With `M_i = I + Lᵀ Z_iᵀ Z_i L` the Woodbury
//! identity gives
//!
//! ```text
//! V_i⁻¹ = I − Z_i L M_i⁻¹ Lᵀ Z_iᵀ,     log|V_i| = log|M_i|
//! ```
//!
//! so everything reduces to per-group cross products computed once up front.
//! Deviances (−2 log-likelihood):
//!
//! ```text
//! ML:   Σ log|M_i| + n (1 + log(2π σ̂²)),                     σ̂² = r'V⁻¹r / n
//! REML: Σ log|M_i| + log|X'V⁻¹X| + (n−p)(1 + log(2π σ̂²)),   σ̂² = r'V⁻¹r / (n−p)
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::domain::{FitMethod, ModelSpec, ObservationTable};
use crate::models::{fill_fixed_row, fill_random_row};

/// Cross products of one group.
#[derive(Debug, Clone)]
pub struct GroupBlock {
    pub name: String,
    pub size: usize,
    pub ztz: DMatrix<f64>,
    pub ztx: DMatrix<f64>,
    pub zty: DVector<f64>,
}

impl GroupBlock {
    fn new(name: String, p: usize, q: usize) -> Self {
        Self {
            name,
            size: 0,
            ztz: DMatrix::zeros(q, q),
            ztx: DMatrix::zeros(q, p),
            zty: DVector::zeros(q),
        }
    }

    /// Cholesky factorisation of `M = I + Lᵀ Zᵀ Z L`.
    pub fn m_cholesky(&self, l: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
        let q = l.nrows();
        let m = DMatrix::identity(q, q) + l.transpose() * &self.ztz * l;
        m.cholesky()
    }
}

/// Design cross products for the whole table, grouped.
#[derive(Debug, Clone)]
pub struct DesignBlocks {
    pub groups: Vec<GroupBlock>,
    /// Group index of each observation, in table order.
    pub group_of: Vec<usize>,
    pub xtx: DMatrix<f64>,
    pub xty: DVector<f64>,
    pub yty: f64,
    pub n: usize,
    pub p: usize,
    pub q: usize,
}

/// Profiled estimates at a fixed θ.
#[derive(Debug, Clone)]
pub struct Profile {
    pub deviance: f64,
    pub beta: DVector<f64>,
    pub sigma2: f64,
    /// `X'V⁻¹X` (unscaled by σ²).
    pub xvx: DMatrix<f64>,
}

impl DesignBlocks {
    pub fn build(table: &ObservationTable, spec: &ModelSpec) -> Self {
        let p = spec.fixed_len();
        let q = spec.random_len();

        let mut groups: Vec<GroupBlock> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut group_of = Vec::with_capacity(table.len());

        let mut xtx = DMatrix::zeros(p, p);
        let mut xty = DVector::zeros(p);
        let mut yty = 0.0;

        let mut x = vec![0.0; p];
        let mut z = vec![0.0; q];

        for obs in &table.observations {
            fill_fixed_row(spec, obs, &mut x);
            fill_random_row(spec, obs, &mut z);
            let y = obs.shortfall;

            let g = *index.entry(obs.group.as_str()).or_insert_with(|| {
                groups.push(GroupBlock::new(obs.group.clone(), p, q));
                groups.len() - 1
            });
            group_of.push(g);

            let block = &mut groups[g];
            block.size += 1;
            for a in 0..q {
                block.zty[a] += z[a] * y;
                for b in 0..q {
                    block.ztz[(a, b)] += z[a] * z[b];
                }
                for b in 0..p {
                    block.ztx[(a, b)] += z[a] * x[b];
                }
            }
            for a in 0..p {
                xty[a] += x[a] * y;
                for b in 0..p {
                    xtx[(a, b)] += x[a] * x[b];
                }
            }
            yty += y * y;
        }

        Self {
            groups,
            group_of,
            xtx,
            xty,
            yty,
            n: table.len(),
            p,
            q,
        }
    }

    /// Residual degrees of freedom used for σ̂².
    pub fn residual_df(&self, method: FitMethod) -> f64 {
        match method {
            FitMethod::Ml => self.n as f64,
            FitMethod::Reml => self.n as f64 - self.p as f64,
        }
    }

    /// Profile out β and σ² at `theta`.
    ///
    /// Returns `None` when the fixed-effect system is singular or the profiled
    /// residual variance is not positive.
    pub fn profile(&self, theta: &[f64], method: FitMethod) -> Option<Profile> {
        let l = lower_factor(theta, self.q);

        let mut xvx = self.xtx.clone();
        let mut xvy = self.xty.clone();
        let mut yvy = self.yty;
        let mut logdet_m = 0.0;

        for block in &self.groups {
            let chol = block.m_cholesky(&l)?;
            logdet_m += cholesky_logdet(&chol);

            let u_x = l.transpose() * &block.ztx;
            let u_y = l.transpose() * &block.zty;
            let m_inv_ux = chol.solve(&u_x);
            let m_inv_uy = chol.solve(&u_y);

            xvx -= u_x.transpose() * &m_inv_ux;
            xvy -= u_x.transpose() * &m_inv_uy;
            yvy -= u_y.dot(&m_inv_uy);
        }

        let xvx_chol = xvx.clone().cholesky()?;
        if !is_well_conditioned(&xvx_chol, &xvx) {
            return None;
        }
        let beta = xvx_chol.solve(&xvy);
        let rss = yvy - xvy.dot(&beta);

        let df = self.residual_df(method);
        if df <= 0.0 {
            return None;
        }
        let sigma2 = rss / df;
        if !(sigma2.is_finite() && sigma2 > 0.0) {
            return None;
        }

        let mut deviance = logdet_m + df * (1.0 + (2.0 * PI * sigma2).ln());
        if method == FitMethod::Reml {
            deviance += cholesky_logdet(&xvx_chol);
        }
        if !deviance.is_finite() {
            return None;
        }

        Some(Profile {
            deviance,
            beta,
            sigma2,
            xvx,
        })
    }

    /// Profiled deviance, `+∞` where undefined.
    pub fn deviance(&self, theta: &[f64], method: FitMethod) -> f64 {
        self.profile(theta, method)
            .map(|p| p.deviance)
            .unwrap_or(f64::INFINITY)
    }
}

/// Unpack θ (row-wise lower triangle) into `L`.
pub fn lower_factor(theta: &[f64], q: usize) -> DMatrix<f64> {
    let mut l = DMatrix::zeros(q, q);
    let mut k = 0;
    for i in 0..q {
        for j in 0..=i {
            l[(i, j)] = theta[k];
            k += 1;
        }
    }
    l
}

/// Smallest allowed squared pivot of the correlation-scaled matrix.
const PIVOT_RATIO_MIN: f64 = 1e-12;

/// Rejects factorisations of numerically singular matrices: rounding can turn
/// an exactly collinear design into a tiny positive pivot.
///
/// The test runs on `D^{-1/2} A D^{-1/2}` with `D = diag(A)`, whose Cholesky
/// pivots are `L_jj / sqrt(A_jj)`. Each squared pivot is then `1 - R²` of
/// column `j` on the columns before it, so predictors measured in very
/// different units are not mistaken for collinear ones.
fn is_well_conditioned(chol: &Cholesky<f64, Dyn>, a: &DMatrix<f64>) -> bool {
    chol.l()
        .diagonal()
        .iter()
        .zip(a.diagonal().iter())
        .all(|(&l, &d)| d > 0.0 && l * l / d > PIVOT_RATIO_MIN)
}

fn cholesky_logdet(chol: &Cholesky<f64, Dyn>) -> f64 {
    2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>()
}
