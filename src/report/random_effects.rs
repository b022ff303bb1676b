//! Per-group random-effect table with 95% Wald intervals.

use crate::domain::{CiStrategy, FittedModel};
use crate::report::Z_95;

/// One group's row.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomEffectRow {
    pub group: String,
    pub intercept: f64,
    pub slopes: Vec<f64>,
    pub lower: f64,
    pub upper: f64,
}

/// Rows sorted ascending by intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomEffectsTable {
    /// Number of `Slope_k` columns.
    pub slope_count: usize,
    pub rows: Vec<RandomEffectRow>,
}

impl RandomEffectsTable {
    /// Column names: `Intercept, Slope_0.., group, lower, upper`.
    pub fn headers(&self) -> Vec<String> {
        let mut h = vec!["Intercept".to_string()];
        h.extend((0..self.slope_count).map(|k| format!("Slope_{k}")));
        h.extend(["group", "lower", "upper"].map(String::from));
        h
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Build the random-effects table.
///
/// With [`CiStrategy::Global`] every interval uses `sqrt(cov_re[0,0])`; with
/// [`CiStrategy::Conditional`] each group uses the conditional standard error
/// of its own predicted intercept.
pub fn extract_random_effects(model: &FittedModel, strategy: CiStrategy) -> RandomEffectsTable {
    let global_se = if model.cov_re.nrows() > 0 {
        model.cov_re[(0, 0)].max(0.0).sqrt()
    } else {
        0.0
    };

    let mut rows: Vec<RandomEffectRow> = model
        .random_effects
        .iter()
        .map(|g| {
            let se = match strategy {
                CiStrategy::Global => global_se,
                CiStrategy::Conditional => g.intercept_cond_var.max(0.0).sqrt(),
            };
            let intercept = g.effect.intercept;
            RandomEffectRow {
                group: g.group.clone(),
                intercept,
                slopes: g.effect.slopes.clone(),
                lower: intercept - Z_95 * se,
                upper: intercept + Z_95 * se,
            }
        })
        .collect();

    // Stable: equal intercepts keep first-seen group order.
    rows.sort_by(|a, b| a.intercept.total_cmp(&b.intercept));

    RandomEffectsTable {
        slope_count: model.slope_names.len(),
        rows,
    }
}
