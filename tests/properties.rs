//! Property-based tests for the container helpers and the random-effects table.

use std::collections::HashMap;

use energy_lmm::domain::{CiStrategy, FitMethod, FittedModel, GroupEffect, RandomEffect};
use energy_lmm::exercises::{
    count_occurrences, has_key, reverse_list, string_length, sum_list, swap_dict, tuples_to_dict,
    unique_elements,
};
use energy_lmm::report::extract_random_effects;
use nalgebra::DMatrix;
use proptest::prelude::*;

fn model_with_intercepts(intercepts: &[f64], cond_vars: &[f64], group_var: f64) -> FittedModel {
    let random_effects = intercepts
        .iter()
        .zip(cond_vars)
        .enumerate()
        .map(|(i, (&intercept, &v))| GroupEffect {
            group: format!("G{i:03}"),
            effect: RandomEffect {
                intercept,
                slopes: Vec::new(),
            },
            intercept_cond_var: v,
            size: 1,
        })
        .collect();
    FittedModel {
        method: FitMethod::Reml,
        formula: "shortfall ~ n_rooms + age".to_string(),
        fixed_names: vec!["Intercept".into()],
        fixed_effects: vec![0.0],
        fixed_cov: DMatrix::identity(1, 1),
        slope_names: Vec::new(),
        scale: 1.0,
        cov_re: DMatrix::from_element(1, 1, group_var),
        random_effects,
        fitted: Vec::new(),
        residuals: Vec::new(),
        log_likelihood: 0.0,
        converged: true,
        iterations: 0,
        n_obs: intercepts.len(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_reverse_is_an_involution(v in prop::collection::vec(any::<i32>(), 0..50)) {
        prop_assert_eq!(reverse_list(&reverse_list(&v)), v);
    }

    #[test]
    fn prop_sum_of_integers_matches_fold(v in prop::collection::vec(-1000i64..1000, 0..50)) {
        prop_assert_eq!(sum_list(&v), v.iter().fold(0, |a, b| a + b));
    }

    #[test]
    fn prop_swap_dict_is_an_involution_for_unique_values(
        keys in prop::collection::hash_set("[a-z]{1,6}", 0..20)
    ) {
        // Values are the positions, hence unique.
        let d: HashMap<String, usize> = keys.into_iter().enumerate().map(|(i, k)| (k, i)).collect();
        prop_assert_eq!(swap_dict(swap_dict(d.clone())), d);
    }

    #[test]
    fn prop_tuples_to_dict_inverts_pairs(
        d in prop::collection::hash_map("[a-z]{1,6}", any::<i64>(), 0..20)
    ) {
        let pairs: Vec<(String, i64)> = d.clone().into_iter().collect();
        prop_assert_eq!(tuples_to_dict(pairs), d);
    }

    #[test]
    fn prop_has_key_agrees_with_membership(
        d in prop::collection::hash_map(any::<u8>(), any::<u8>(), 0..20),
        key in any::<u8>(),
    ) {
        prop_assert_eq!(has_key(&d, &key), d.keys().any(|k| *k == key));
    }

    #[test]
    fn prop_counts_and_uniques_are_consistent(v in prop::collection::vec(0u8..5, 0..40)) {
        let uniques = unique_elements(&v);
        let total: usize = uniques.iter().map(|x| count_occurrences(&v, x)).sum();
        prop_assert_eq!(total, v.len());
    }

    #[test]
    fn prop_string_length_counts_chars(s in "\\PC{0,30}") {
        prop_assert_eq!(string_length(&s), s.chars().count());
    }

    #[test]
    fn prop_random_effects_table_invariants(
        rows in prop::collection::vec((-100.0f64..100.0, 0.0f64..4.0), 1..40),
        group_var in 0.0f64..9.0,
        conditional in any::<bool>(),
    ) {
        let (intercepts, cond_vars): (Vec<f64>, Vec<f64>) = rows.into_iter().unzip();
        let model = model_with_intercepts(&intercepts, &cond_vars, group_var);
        let strategy = if conditional { CiStrategy::Conditional } else { CiStrategy::Global };
        let table = extract_random_effects(&model, strategy);

        prop_assert_eq!(table.len(), intercepts.len());
        for r in &table.rows {
            prop_assert!(r.lower <= r.intercept && r.intercept <= r.upper);
        }
        for w in table.rows.windows(2) {
            prop_assert!(w[0].intercept <= w[1].intercept);
        }
    }
}
