//! Box-constrained Nelder–Mead minimisation.
//!
//! The profiled mixed-model deviance has one to a handful of parameters and no
//! cheap gradient, so a derivative-free simplex search is enough. Every trial
//! point is projected into the box before evaluation; non-finite objective
//! values are treated as `+∞`.

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Stopping rules for [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    pub max_iter: usize,
    /// Relative tolerance on the objective spread across the simplex.
    pub f_tol: f64,
    /// Relative tolerance on the simplex diameter.
    pub x_tol: f64,
    /// Absolute floor for the initial simplex edge.
    pub min_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iter: 500,
            f_tol: 1e-8,
            x_tol: 1e-6,
            min_step: 0.05,
        }
    }
}

/// Inclusive per-coordinate bounds.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn project(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            *v = v.clamp(self.lower[i], self.upper[i]);
        }
    }
}

/// Result of a minimisation.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `f` starting from `start`.
pub fn nelder_mead<F>(f: F, start: &[f64], bounds: &Bounds, opts: &NelderMeadOptions) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut x0 = start.to_vec();
    bounds.project(&mut x0);
    let f0 = eval(&x0);

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let step = (0.1 * x0[i].abs()).max(opts.min_step);
        let mut xi = x0.clone();
        xi[i] += step;
        bounds.project(&mut xi);
        // Starting on the upper bound: step inwards instead.
        if (xi[i] - x0[i]).abs() < f64::EPSILON {
            xi[i] = x0[i] - step;
            bounds.project(&mut xi);
        }
        let fi = eval(&xi);
        simplex.push((xi, fi));
    }

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iter {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        if has_converged(&simplex, opts) {
            converged = true;
            break;
        }
        iterations += 1;

        let worst = simplex[n].clone();
        let centroid = centroid(&simplex[..n]);

        let reflected = towards(&centroid, &worst.0, -REFLECT, bounds);
        let f_reflected = eval(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = towards(&centroid, &reflected, EXPAND, bounds);
            let f_expanded = eval(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let (contracted, accept_below) = if f_reflected < worst.1 {
            (towards(&centroid, &reflected, CONTRACT, bounds), f_reflected)
        } else {
            (towards(&centroid, &worst.0, CONTRACT, bounds), worst.1)
        };
        let f_contracted = eval(&contracted);
        if f_contracted < accept_below || (f_contracted <= accept_below && f_reflected < worst.1) {
            simplex[n] = (contracted, f_contracted);
            continue;
        }

        let best = simplex[0].0.clone();
        for vertex in simplex.iter_mut().skip(1) {
            let shrunk = towards(&best, &vertex.0, SHRINK, bounds);
            let f_shrunk = eval(&shrunk);
            *vertex = (shrunk, f_shrunk);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    if !converged {
        converged = has_converged(&simplex, opts);
    }
    let (x, value) = simplex.swap_remove(0);

    Minimum {
        x,
        value,
        iterations,
        converged,
    }
}

fn has_converged(simplex: &[(Vec<f64>, f64)], opts: &NelderMeadOptions) -> bool {
    let (best, f_best) = (&simplex[0].0, simplex[0].1);
    let f_worst = simplex[simplex.len() - 1].1;
    if !f_best.is_finite() || !f_worst.is_finite() {
        return false;
    }
    let f_spread = f_worst - f_best;
    if f_spread > opts.f_tol * (1.0 + f_best.abs()) {
        return false;
    }

    let scale = 1.0 + best.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let diameter = simplex[1..]
        .iter()
        .flat_map(|(x, _)| x.iter().zip(best).map(|(a, b)| (a - b).abs()))
        .fold(0.0_f64, f64::max);
    diameter <= opts.x_tol * scale
}

fn centroid(points: &[(Vec<f64>, f64)]) -> Vec<f64> {
    let dim = points[0].0.len();
    let mut c = vec![0.0; dim];
    for (x, _) in points {
        for (ci, xi) in c.iter_mut().zip(x) {
            *ci += xi;
        }
    }
    let k = points.len() as f64;
    c.iter_mut().for_each(|v| *v /= k);
    c
}

/// `origin + t * (target - origin)`, projected into the box.
fn towards(origin: &[f64], target: &[f64], t: f64, bounds: &Bounds) -> Vec<f64> {
    let mut out: Vec<f64> = origin
        .iter()
        .zip(target)
        .map(|(o, x)| o + t * (x - o))
        .collect();
    bounds.project(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded(n: usize) -> Bounds {
        Bounds {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    #[test]
    fn minimises_a_quadratic_bowl() {
        let f = |x: &[f64]| (x[0] - 1.0).powi(2) + 3.0 * (x[1] + 2.0).powi(2);
        let m = nelder_mead(f, &[0.0, 0.0], &unbounded(2), &NelderMeadOptions::default());
        assert!(m.converged);
        assert!((m.x[0] - 1.0).abs() < 1e-3, "x0={}", m.x[0]);
        assert!((m.x[1] + 2.0).abs() < 1e-3, "x1={}", m.x[1]);
    }

    #[test]
    fn one_dimensional_search() {
        let f = |x: &[f64]| (x[0] - 0.7).powi(2) + 5.0;
        let m = nelder_mead(f, &[3.0], &unbounded(1), &NelderMeadOptions::default());
        assert!(m.converged);
        assert!((m.x[0] - 0.7).abs() < 1e-3);
        assert!((m.value - 5.0).abs() < 1e-6);
    }

    #[test]
    fn respects_bounds_when_minimum_is_outside() {
        let f = |x: &[f64]| -x[0];
        let bounds = Bounds {
            lower: vec![0.0],
            upper: vec![2.0],
        };
        let m = nelder_mead(f, &[1.0], &bounds, &NelderMeadOptions::default());
        assert!(m.converged);
        assert!((m.x[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn starting_on_the_bound_converges() {
        let f = |x: &[f64]| -x[0];
        let bounds = Bounds {
            lower: vec![0.0],
            upper: vec![2.0],
        };
        let m = nelder_mead(f, &[2.0], &bounds, &NelderMeadOptions::default());
        assert!(m.converged);
        assert!((m.x[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn reports_non_convergence_when_out_of_iterations() {
        let f = |x: &[f64]| (x[0] - 100.0).powi(2);
        let opts = NelderMeadOptions {
            max_iter: 2,
            ..NelderMeadOptions::default()
        };
        let m = nelder_mead(f, &[0.0], &unbounded(1), &opts);
        assert!(!m.converged);
        assert_eq!(m.iterations, 2);
    }
}
